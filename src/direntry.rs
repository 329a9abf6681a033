//! Directory-entry codec and the per-block scanner that recovers both the
//! live entry chain and the ghost entries left behind in slack space.

use std::collections::HashSet;

pub const EXT2_FT_REG_FILE: u8 = 1;
pub const EXT2_FT_DIR: u8 = 2;

/// Bytes an entry actually occupies: 8-byte header plus the name, rounded up
/// to the 4-byte alignment the kernel uses when chaining `rec_len`s.
pub fn entry_size(name_length: usize) -> usize {
    (8 + name_length + 3) & !3
}

/// One directory entry, live or salvaged. Names are kept as raw bytes; the
/// on-disk format imposes no character set and forensic output must not
/// launder what it found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub rec_len: u16,
    pub file_type: u8,
    pub name: Vec<u8>,
}

impl DirEntry {
    /// Parse an entry header at the start of `data`. Returns `None` when
    /// fewer than 8 header bytes are available; the name is clipped to the
    /// slice.
    pub fn from_bytes(data: &[u8]) -> Option<DirEntry> {
        if data.len() < 8 {
            return None;
        }
        let inode = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let name_length = data[6] as usize;
        let file_type = data[7];
        let name_end = (8 + name_length).min(data.len());
        Some(DirEntry {
            inode,
            rec_len,
            file_type,
            name: data[8..name_end].to_vec(),
        })
    }

    /// Re-serialize into the on-disk layout, zero-padded to 4-byte alignment.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = vec![0u8; entry_size(self.name.len())];
        out[0..4].copy_from_slice(&self.inode.to_le_bytes());
        out[4..6].copy_from_slice(&self.rec_len.to_le_bytes());
        out[6] = self.name.len() as u8;
        out[7] = self.file_type;
        out[8..8 + self.name.len()].copy_from_slice(&self.name);
        out
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == EXT2_FT_DIR
    }

    fn is_dot(&self) -> bool {
        self.name == b"." || self.name == b".."
    }
}

/// Result of scanning one directory block.
#[derive(Debug, Default)]
pub struct BlockScan {
    pub live: Vec<DirEntry>,
    pub ghosts: Vec<DirEntry>,
}

/// Walk the live `rec_len` chain of a directory block and salvage ghost
/// entries from the slack behind each link.
///
/// A zero `rec_len` terminates the scan (malformed chain); a zero inode marks
/// a tombstoned entry that is skipped but whose slack is still salvaged.
/// Ghosts whose inode also appears as a live entry of the same block are
/// suppressed.
pub fn scan_block(block: &[u8]) -> BlockScan {
    let mut scan = BlockScan::default();
    let mut live_inodes: HashSet<u32> = HashSet::new();

    let mut offset = 0usize;
    while offset + 8 <= block.len() {
        let entry = match DirEntry::from_bytes(&block[offset..]) {
            Some(e) => e,
            None => break,
        };
        let rec_len = entry.rec_len as usize;
        if rec_len == 0 {
            break;
        }

        if entry.inode != 0 && !entry.is_dot() {
            live_inodes.insert(entry.inode);
        }

        let occupied = entry_size(entry.name.len());
        if rec_len > occupied {
            let start = offset + occupied;
            let end = (offset + rec_len).min(block.len());
            salvage_slack(block, start, end, &mut scan.ghosts);
        }

        if entry.inode != 0 && !entry.is_dot() {
            scan.live.push(entry);
        }

        offset += rec_len;
    }

    scan.ghosts.retain(|g| !live_inodes.contains(&g.inode));
    scan
}

/// Scan a slack region `[start, end)` for structurally-plausible entries.
/// Implausible headers advance by 4 bytes (alignment step) and retry;
/// accepted ghosts advance by their occupied size.
fn salvage_slack(block: &[u8], start: usize, end: usize, ghosts: &mut Vec<DirEntry>) {
    let mut offset = start;
    while offset + 8 <= end {
        let inode = u32::from_le_bytes(block[offset..offset + 4].try_into().unwrap());
        let rec_len = u16::from_le_bytes(block[offset + 4..offset + 6].try_into().unwrap());
        let name_length = block[offset + 6] as usize;
        let file_type = block[offset + 7];

        if inode == 0 || name_length == 0 || rec_len == 0 || offset + 8 + name_length > end {
            offset += 4;
            continue;
        }

        let ghost = DirEntry {
            inode,
            rec_len,
            file_type,
            name: block[offset + 8..offset + 8 + name_length].to_vec(),
        };
        if !ghost.is_dot() {
            ghosts.push(ghost);
        }

        offset += entry_size(name_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay entries into a zeroed pseudo-block at explicit offsets.
    fn block_with(parts: &[(usize, DirEntry)], len: usize) -> Vec<u8> {
        let mut block = vec![0u8; len];
        for (offset, entry) in parts {
            let raw = entry.to_bytes();
            block[*offset..*offset + raw.len()].copy_from_slice(&raw);
        }
        block
    }

    fn entry(inode: u32, rec_len: u16, file_type: u8, name: &[u8]) -> DirEntry {
        DirEntry {
            inode,
            rec_len,
            file_type,
            name: name.to_vec(),
        }
    }

    #[test]
    fn round_trips_the_recovered_tuple() {
        let e = entry(77, 24, EXT2_FT_REG_FILE, b"sample.txt");
        let parsed = DirEntry::from_bytes(&e.to_bytes()).unwrap();
        assert_eq!(parsed, e);
    }

    #[test]
    fn walks_live_chain_and_skips_dots() {
        let block = block_with(
            &[
                (0, entry(2, 12, EXT2_FT_DIR, b".")),
                (12, entry(2, 12, EXT2_FT_DIR, b"..")),
                (24, entry(11, 40, EXT2_FT_REG_FILE, b"a")),
            ],
            64,
        );
        let scan = scan_block(&block);
        assert_eq!(scan.live.len(), 1);
        assert_eq!(scan.live[0].name, b"a");
        assert!(scan.ghosts.is_empty());
    }

    #[test]
    fn salvages_ghost_from_slack() {
        // Live "b" occupies 12 bytes but owns the whole remaining record;
        // the ghost "a" residue sits in its slack.
        let block = block_with(
            &[
                (0, entry(11, 64, EXT2_FT_REG_FILE, b"b")),
                (12, entry(12, 12, EXT2_FT_REG_FILE, b"a")),
            ],
            64,
        );
        let scan = scan_block(&block);
        assert_eq!(scan.live.len(), 1);
        assert_eq!(scan.ghosts.len(), 1);
        assert_eq!(scan.ghosts[0].inode, 12);
        assert_eq!(scan.ghosts[0].name, b"a");
    }

    #[test]
    fn suppresses_ghosts_masked_by_live_entries() {
        // Rename residue: the ghost carries the same inode as the live entry.
        let block = block_with(
            &[
                (0, entry(11, 64, EXT2_FT_REG_FILE, b"b")),
                (12, entry(11, 12, EXT2_FT_REG_FILE, b"a")),
            ],
            64,
        );
        let scan = scan_block(&block);
        assert_eq!(scan.live.len(), 1);
        assert!(scan.ghosts.is_empty());
    }

    #[test]
    fn scans_slack_of_tombstoned_entries() {
        let block = block_with(
            &[
                (0, entry(0, 64, 0, b"")),
                (8, entry(13, 12, EXT2_FT_REG_FILE, b"gone")),
            ],
            64,
        );
        // Tombstone header: name_length 0, occupied 8, slack covers the rest.
        let scan = scan_block(&block);
        assert!(scan.live.is_empty());
        assert_eq!(scan.ghosts.len(), 1);
        assert_eq!(scan.ghosts[0].name, b"gone");
    }

    #[test]
    fn zero_rec_len_terminates_the_block() {
        let block = block_with(
            &[
                (0, entry(11, 12, EXT2_FT_REG_FILE, b"a")),
                (12, entry(12, 0, EXT2_FT_REG_FILE, b"x")),
                (24, entry(13, 12, EXT2_FT_REG_FILE, b"c")),
            ],
            36,
        );
        let scan = scan_block(&block);
        assert_eq!(scan.live.len(), 1);
        assert_eq!(scan.live[0].inode, 11);
    }

    #[test]
    fn salvage_steps_past_implausible_headers() {
        // Garbage (inode 0) for 8 bytes, then a plausible ghost 4-aligned in.
        let mut parts = vec![(0usize, entry(11, 32, EXT2_FT_REG_FILE, b"k"))];
        parts.push((16, entry(14, 12, EXT2_FT_DIR, b"old")));
        let block = block_with(&parts, 32);
        let scan = scan_block(&block);
        assert_eq!(scan.ghosts.len(), 1);
        assert_eq!(scan.ghosts[0].inode, 14);
        assert!(scan.ghosts[0].is_directory());
    }

    #[test]
    fn ghost_names_keep_unprintable_bytes() {
        let weird = entry(15, 16, EXT2_FT_REG_FILE, b"\x01\xffz");
        let block = block_with(
            &[(0, entry(11, 32, EXT2_FT_REG_FILE, b"k")), (12, weird)],
            32,
        );
        let scan = scan_block(&block);
        assert_eq!(scan.ghosts[0].name, b"\x01\xffz");
    }
}
