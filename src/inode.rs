/// Reference: https://www.kernel.org/doc/html/latest/filesystems/ext4/dynamic.html#index-nodes
use chrono::{TimeZone, Utc};
use prettytable::{Cell, Row, Table};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The classic 128-byte ext2 inode record. Larger on-disk inode sizes carry
/// extra bytes after this layout; they are ignored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inode {
    pub i_num: u32,
    pub i_mode: u16,
    pub i_uid: u16,
    pub i_size: u32,
    pub i_atime: u32,
    pub i_ctime: u32,
    pub i_mtime: u32,
    pub i_dtime: u32,
    pub i_atime_h: String,
    pub i_ctime_h: String,
    pub i_mtime_h: String,
    pub i_dtime_h: String,
    pub i_gid: u16,
    pub i_links_count: u16,
    pub i_blocks: u32,
    pub i_flags: u32,
    pub i_block: [u32; 15],
    pub i_generation: u32,
}

/// Render an ext mode word (file-type bits included) in the 10-character
/// `ls -l` form, e.g. "-rw-r--r--".
pub fn mode_to_string(mode: u16) -> String {
    const S_IFMT: u16 = 0o170000;
    const FILE_TYPES: [(u16, u8); 7] = [
        (0o140000, b's'), // socket
        (0o120000, b'l'), // symlink
        (0o100000, b'-'), // regular
        (0o060000, b'b'), // block device
        (0o040000, b'd'), // directory
        (0o020000, b'c'), // character device
        (0o010000, b'p'), // fifo
    ];
    const PERM_BITS: [u16; 9] = [
        0o400, 0o200, 0o100, 0o040, 0o020, 0o010, 0o004, 0o002, 0o001,
    ];
    // setuid / setgid / sticky take over the x slot of their triplet.
    const SPECIAL_BITS: [(u16, usize, u8, u8); 3] = [
        (0o4000, 3, b's', b'S'),
        (0o2000, 6, b's', b'S'),
        (0o1000, 9, b't', b'T'),
    ];

    let mut out = [b'-'; 10];
    out[0] = FILE_TYPES
        .iter()
        .find(|&&(fmt, _)| mode & S_IFMT == fmt)
        .map_or(b'?', |&(_, ch)| ch);

    for (slot, &bit) in PERM_BITS.iter().enumerate() {
        if mode & bit != 0 {
            out[slot + 1] = [b'r', b'w', b'x'][slot % 3];
        }
    }
    for &(bit, slot, with_x, without_x) in &SPECIAL_BITS {
        if mode & bit != 0 {
            out[slot] = if out[slot] == b'x' { with_x } else { without_x };
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

impl Inode {
    /// Parse the first 128 bytes of an on-disk inode record. Short slices are
    /// zero-padded so a salvaged, partially-overwritten record still parses.
    pub fn from_bytes(i_num: u32, data: &[u8]) -> Self {
        let mut raw = [0u8; 128];
        let n = data.len().min(128);
        raw[..n].copy_from_slice(&data[..n]);

        let le_u16 =
            |offset: usize| -> u16 { u16::from_le_bytes(raw[offset..offset + 2].try_into().unwrap()) };
        let le_u32 =
            |offset: usize| -> u32 { u32::from_le_bytes(raw[offset..offset + 4].try_into().unwrap()) };

        let format_time = |seconds: u32| {
            Utc.timestamp_opt(seconds as i64, 0)
                .single()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_default()
        };

        let i_atime = le_u32(0x08);
        let i_ctime = le_u32(0x0C);
        let i_mtime = le_u32(0x10);
        let i_dtime = le_u32(0x14);

        let mut i_block = [0u32; 15];
        for (i, slot) in i_block.iter_mut().enumerate() {
            *slot = le_u32(0x28 + i * 4);
        }

        Inode {
            i_num,
            i_mode: le_u16(0x00),
            i_uid: le_u16(0x02),
            i_size: le_u32(0x04),
            i_atime,
            i_ctime,
            i_mtime,
            i_dtime,
            i_atime_h: format_time(i_atime),
            i_ctime_h: format_time(i_ctime),
            i_mtime_h: format_time(i_mtime),
            i_dtime_h: format_time(i_dtime),
            i_gid: le_u16(0x18),
            i_links_count: le_u16(0x1A),
            i_blocks: le_u32(0x1C),
            i_flags: le_u32(0x20),
            i_block,
            i_generation: le_u32(0x64),
        }
    }

    /// A zeroed record, standing in for an unreadable ghost-referenced inode.
    pub fn empty(i_num: u32) -> Self {
        Self::from_bytes(i_num, &[])
    }

    pub fn mode(&self) -> u16 {
        self.i_mode
    }

    pub fn size(&self) -> u32 {
        self.i_size
    }

    /// Check if this inode is a directory (S_IFDIR).
    pub fn is_dir(&self) -> bool {
        (self.i_mode & 0o170000) == 0o040000
    }

    /// Check if this inode is a regular file (S_IFREG).
    pub fn is_regular_file(&self) -> bool {
        (self.i_mode & 0o170000) == 0o100000
    }

    /// The 12 direct pointers, then single/double/triple indirect roots.
    pub fn block_pointers(&self) -> &[u32; 15] {
        &self.i_block
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }

    /// String representation of an Inode using prettytable
    pub fn to_table_string(&self) -> String {
        let mut inode_table = Table::new();

        inode_table.add_row(Row::new(vec![
            Cell::new("Identifier"),
            Cell::new(&format!("{}", self.i_num)),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("Mode"),
            Cell::new(&mode_to_string(self.i_mode)),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("Links Count"),
            Cell::new(&format!("{}", self.i_links_count)),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("Size"),
            Cell::new(&format!("{}", self.i_size)),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("atime (Access Time)"),
            Cell::new(&self.i_atime_h),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("ctime (Change Time)"),
            Cell::new(&self.i_ctime_h),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("mtime (Modification Time)"),
            Cell::new(&self.i_mtime_h),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("dtime (Deletion Time)"),
            Cell::new(&self.i_dtime_h),
        ]));
        inode_table.add_row(Row::new(vec![
            Cell::new("Block Pointers"),
            Cell::new(&format!("{:?}", self.block_pointers())),
        ]));
        inode_table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_inode(mode: u16, atime: u32, mtime: u32, ctime: u32, dtime: u32) -> [u8; 128] {
        let mut data = [0u8; 128];
        data[0x00..0x02].copy_from_slice(&mode.to_le_bytes());
        data[0x08..0x0C].copy_from_slice(&atime.to_le_bytes());
        data[0x0C..0x10].copy_from_slice(&ctime.to_le_bytes());
        data[0x10..0x14].copy_from_slice(&mtime.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&dtime.to_le_bytes());
        data[0x1A..0x1C].copy_from_slice(&1u16.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&42u32.to_le_bytes());
        data
    }

    #[test]
    fn parses_classic_fields() {
        let ino = Inode::from_bytes(12, &raw_inode(0o100644, 10, 20, 30, 0));
        assert!(ino.is_regular_file());
        assert!(!ino.is_dir());
        assert_eq!(ino.i_atime, 10);
        assert_eq!(ino.i_mtime, 20);
        assert_eq!(ino.i_ctime, 30);
        assert_eq!(ino.i_dtime, 0);
        assert_eq!(ino.block_pointers()[0], 42);
        assert_eq!(ino.to_json()["i_num"], 12);
    }

    #[test]
    fn empty_record_is_typeless() {
        let ino = Inode::empty(99);
        assert!(!ino.is_dir());
        assert!(!ino.is_regular_file());
        assert_eq!(ino.i_dtime, 0);
    }

    #[test]
    fn mode_strings() {
        assert_eq!(mode_to_string(0o100644), "-rw-r--r--");
        assert_eq!(mode_to_string(0o040755), "drwxr-xr-x");
        assert_eq!(mode_to_string(0o104755), "-rwsr-xr-x");
        assert_eq!(mode_to_string(0o041755), "drwxr-xr-t");
        assert_eq!(mode_to_string(0o102644), "-rw-r-Sr--");
        let table = Inode::from_bytes(2, &raw_inode(0o040755, 1, 1, 1, 0)).to_table_string();
        assert!(table.contains("dtime"));
    }
}
