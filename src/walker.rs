//! Recursive directory traversal rooted at inode 2.
//!
//! The walker renders the augmented tree (live entries plus ghost residue)
//! and is the sole writer of the inode-observation index handed to the
//! history classifier afterwards.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Seek};

use log::debug;

use crate::direntry::{scan_block, DirEntry};
use crate::error::Result;
use crate::inode::{mode_to_string, Inode};
use crate::{Ext2Fs, ROOT_INODE};

/// Where a directory entry was sighted: chained by an active `rec_len`, or
/// salvaged from slack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Live,
    Ghost,
}

/// One sighting of an inode in some directory block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub full_path: Vec<u8>,
    pub name: Vec<u8>,
    pub parent_inode: u32,
    pub kind: EntryKind,
}

impl EntryRecord {
    pub fn is_ghost(&self) -> bool {
        self.kind == EntryKind::Ghost
    }
}

/// Every live and ghost sighting of one inode across the whole walk, plus a
/// snapshot of its on-disk record taken at first sighting.
#[derive(Debug, Clone)]
pub struct InodeObservation {
    pub image: Inode,
    pub entries: Vec<EntryRecord>,
}

/// Keyed by inode number; iteration order keeps downstream output stable.
pub type InodeIndex = BTreeMap<u32, InodeObservation>;

pub struct TreeWalker {
    index: InodeIndex,
    visited: HashSet<u32>,
    out: Vec<u8>,
}

impl TreeWalker {
    /// Walk the filesystem, returning the rendered tree and the observation
    /// index. Failures on the root inode or live references are fatal;
    /// everything under a ghost is best-effort.
    pub fn walk<T: Read + Seek>(fs: &mut Ext2Fs<T>) -> Result<(Vec<u8>, InodeIndex)> {
        let mut walker = TreeWalker {
            index: InodeIndex::new(),
            visited: HashSet::new(),
            out: Vec::new(),
        };

        let root = fs.read_inode(ROOT_INODE)?;
        walker.emit_entry(1, ROOT_INODE, b"root", true, false);
        walker.visited.insert(ROOT_INODE);
        walker.walk_dir(fs, ROOT_INODE, &root, 1, b"", false)?;

        Ok((walker.out, walker.index))
    }

    /// Iterate a directory's data blocks: 12 direct pointers, then single,
    /// double and triple indirection. Pointer arrays end at the first zero.
    fn walk_dir<T: Read + Seek>(
        &mut self,
        fs: &mut Ext2Fs<T>,
        dir_inode: u32,
        inode: &Inode,
        depth: usize,
        path: &[u8],
        in_ghost: bool,
    ) -> Result<()> {
        let ptrs = *inode.block_pointers();

        for &block in &ptrs[..12] {
            if block == 0 {
                break;
            }
            self.scan_data_block(fs, block, dir_inode, depth, path, in_ghost)?;
        }

        if ptrs[12] != 0 {
            for block in fs.indirect_pointers(ptrs[12]) {
                self.scan_data_block(fs, block, dir_inode, depth, path, in_ghost)?;
            }
        }

        if ptrs[13] != 0 {
            for single in fs.indirect_pointers(ptrs[13]) {
                for block in fs.indirect_pointers(single) {
                    self.scan_data_block(fs, block, dir_inode, depth, path, in_ghost)?;
                }
            }
        }

        if ptrs[14] != 0 {
            for double in fs.indirect_pointers(ptrs[14]) {
                for single in fs.indirect_pointers(double) {
                    for block in fs.indirect_pointers(single) {
                        self.scan_data_block(fs, block, dir_inode, depth, path, in_ghost)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn scan_data_block<T: Read + Seek>(
        &mut self,
        fs: &mut Ext2Fs<T>,
        block: u32,
        dir_inode: u32,
        depth: usize,
        path: &[u8],
        in_ghost: bool,
    ) -> Result<()> {
        // Unreadable data blocks lose their evidence but never the walk.
        let data = match fs.read_block(block) {
            Ok(data) => data,
            Err(_) => return Ok(()),
        };

        let scan = scan_block(&data);
        if !scan.ghosts.is_empty() {
            debug!(
                "block {}: {} live, {} ghost entries",
                block,
                scan.live.len(),
                scan.ghosts.len()
            );
        }

        let mut live_images = Vec::with_capacity(scan.live.len());
        for e in &scan.live {
            let image = self.record(fs, e, dir_inode, path, EntryKind::Live)?;
            live_images.push(image);
        }
        let mut ghost_images = Vec::with_capacity(scan.ghosts.len());
        for g in &scan.ghosts {
            let image = self.record(fs, g, dir_inode, path, EntryKind::Ghost)?;
            ghost_images.push(image);
        }

        for (e, image) in scan.live.iter().zip(&live_images) {
            self.emit_and_descend(fs, e, image, depth, path, in_ghost, false)?;
        }
        for (g, image) in scan.ghosts.iter().zip(&ghost_images) {
            self.emit_and_descend(fs, g, image, depth, path, in_ghost, true)?;
        }

        Ok(())
    }

    /// Insert-if-absent into the index and append this sighting. Live inode
    /// reads are fatal; ghost reads fall back to a zeroed record.
    fn record<T: Read + Seek>(
        &mut self,
        fs: &mut Ext2Fs<T>,
        entry: &DirEntry,
        dir_inode: u32,
        path: &[u8],
        kind: EntryKind,
    ) -> Result<Inode> {
        let observation = match self.index.entry(entry.inode) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let image = match kind {
                    EntryKind::Live => fs.read_inode(entry.inode)?,
                    EntryKind::Ghost => fs.read_inode_or_empty(entry.inode),
                };
                v.insert(InodeObservation {
                    image,
                    entries: Vec::new(),
                })
            }
        };
        observation.entries.push(EntryRecord {
            full_path: join_path(path, &entry.name),
            name: entry.name.clone(),
            parent_inode: dir_inode,
            kind,
        });
        Ok(observation.image.clone())
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_and_descend<T: Read + Seek>(
        &mut self,
        fs: &mut Ext2Fs<T>,
        entry: &DirEntry,
        image: &Inode,
        depth: usize,
        path: &[u8],
        in_ghost: bool,
        ghost: bool,
    ) -> Result<()> {
        // Nothing below a ghost directory is rendered; it is still indexed.
        if !in_ghost {
            self.emit_entry(depth + 1, entry.inode, &entry.name, entry.is_directory(), ghost);
        }

        if entry.is_directory() && image.is_dir() && self.visited.insert(entry.inode) {
            debug!(
                "descending into inode {} ({})",
                entry.inode,
                mode_to_string(image.mode())
            );
            let child_path = join_path(path, &entry.name);
            self.walk_dir(
                fs,
                entry.inode,
                image,
                depth + 1,
                &child_path,
                in_ghost || ghost,
            )?;
        }

        Ok(())
    }

    fn emit_entry(&mut self, depth: usize, inode: u32, name: &[u8], dir: bool, ghost: bool) {
        self.out.extend(std::iter::repeat(b'-').take(depth));
        self.out.push(b' ');
        if ghost {
            self.out.push(b'(');
        }
        self.out.extend_from_slice(inode.to_string().as_bytes());
        self.out.push(b':');
        self.out.extend_from_slice(name);
        if dir {
            self.out.push(b'/');
        }
        if ghost {
            self.out.push(b')');
        }
        self.out.push(b'\n');
    }
}

fn join_path(parent: &[u8], name: &[u8]) -> Vec<u8> {
    let mut path = Vec::with_capacity(parent.len() + 1 + name.len());
    path.extend_from_slice(parent);
    path.push(b'/');
    path.extend_from_slice(name);
    path
}
