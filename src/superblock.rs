/// Reference: https://www.kernel.org/doc/html/latest/filesystems/ext4/globals.html#super-block
use serde_json::{json, Value};
use std::convert::TryInto;

use crate::error::Ext2Error;

const EXT2_MAGIC: u16 = 0xEF53;
/// Classic (revision 0) on-disk inode size.
const EXT2_GOOD_OLD_INODE_SIZE: u16 = 128;

#[derive(Debug)]
pub struct Superblock {
    pub s_inodes_count: u32,
    pub s_blocks_count: u32,
    pub s_free_blocks_count: u32,
    pub s_free_inodes_count: u32,
    pub s_first_data_block: u32,
    pub s_log_block_size: u32,
    pub s_blocks_per_group: u32,
    pub s_inodes_per_group: u32,
    pub s_mtime: u32,
    pub s_wtime: u32,
    pub s_mnt_count: u16,
    pub s_max_mnt_count: u16,
    pub s_magic: u16,
    pub s_state: u16,
    pub s_errors: u16,
    pub s_minor_rev_level: u16,
    pub s_lastcheck: u32,
    pub s_checkinterval: u32,
    pub s_creator_os: u32,
    pub s_rev_level: u32,
    pub s_first_ino: u32,
    pub s_inode_size: u16,
}

impl Superblock {
    pub fn from_bytes(data: &[u8]) -> Result<Self, Ext2Error> {
        if data.len() < 0x400 {
            return Err(Ext2Error::BadSuperblock(
                "not enough bytes to parse superblock".to_string(),
            ));
        }
        let le_u16 = |offset: usize| -> u16 {
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
        };
        let le_u32 = |offset: usize| -> u32 {
            u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
        };

        let s_magic = le_u16(0x38);
        if s_magic != EXT2_MAGIC {
            return Err(Ext2Error::BadSuperblock(format!(
                "magic 0x{:04x} is not ext2",
                s_magic
            )));
        }

        let sb = Self {
            s_inodes_count: le_u32(0x00),
            s_blocks_count: le_u32(0x04),
            s_free_blocks_count: le_u32(0x0C),
            s_free_inodes_count: le_u32(0x10),
            s_first_data_block: le_u32(0x14),
            s_log_block_size: le_u32(0x18),
            s_blocks_per_group: le_u32(0x20),
            s_inodes_per_group: le_u32(0x28),
            s_mtime: le_u32(0x2C),
            s_wtime: le_u32(0x30),
            s_mnt_count: le_u16(0x34),
            s_max_mnt_count: le_u16(0x36),
            s_magic,
            s_state: le_u16(0x3A),
            s_errors: le_u16(0x3C),
            s_minor_rev_level: le_u16(0x3E),
            s_lastcheck: le_u32(0x40),
            s_checkinterval: le_u32(0x44),
            s_creator_os: le_u32(0x48),
            s_rev_level: le_u32(0x4C),
            s_first_ino: le_u32(0x54),
            s_inode_size: le_u16(0x58),
        };

        if sb.s_blocks_per_group == 0 || sb.s_inodes_per_group == 0 {
            return Err(Ext2Error::BadSuperblock(
                "zero blocks or inodes per group".to_string(),
            ));
        }

        Ok(sb)
    }

    pub fn block_size(&self) -> u32 {
        1024 << self.s_log_block_size
    }

    pub fn blocks_count(&self) -> u32 {
        self.s_blocks_count
    }

    pub fn first_data_block(&self) -> u32 {
        self.s_first_data_block
    }

    pub fn inodes_per_group(&self) -> u32 {
        self.s_inodes_per_group
    }

    /// Number of block groups, rounding the trailing partial group up.
    pub fn num_groups(&self) -> u32 {
        (self.s_blocks_count + self.s_blocks_per_group - 1) / self.s_blocks_per_group
    }

    /// On-disk inode record size. Revision 0 fixes it at 128 bytes; later
    /// revisions carry it in the superblock (possibly larger, never smaller).
    pub fn inode_size(&self) -> u32 {
        if self.s_rev_level == 0 || self.s_inode_size == 0 {
            EXT2_GOOD_OLD_INODE_SIZE as u32
        } else {
            self.s_inode_size as u32
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "inodes_count": self.s_inodes_count,
            "blocks_count": self.s_blocks_count,
            "free_blocks_count": self.s_free_blocks_count,
            "free_inodes_count": self.s_free_inodes_count,
            "first_data_block": self.s_first_data_block,
            "log_block_size": self.s_log_block_size,
            "blocks_per_group": self.s_blocks_per_group,
            "inodes_per_group": self.s_inodes_per_group,
            "inode_size": self.inode_size(),
            "rev_level": self.s_rev_level,
            "magic": format!("0x{:04x}", self.s_magic),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_superblock() -> Vec<u8> {
        let mut data = vec![0u8; 0x400];
        data[0x00..0x04].copy_from_slice(&64u32.to_le_bytes()); // inodes_count
        data[0x04..0x08].copy_from_slice(&128u32.to_le_bytes()); // blocks_count
        data[0x14..0x18].copy_from_slice(&1u32.to_le_bytes()); // first_data_block
        data[0x18..0x1C].copy_from_slice(&0u32.to_le_bytes()); // log_block_size
        data[0x20..0x24].copy_from_slice(&100u32.to_le_bytes()); // blocks_per_group
        data[0x28..0x2C].copy_from_slice(&64u32.to_le_bytes()); // inodes_per_group
        data[0x38..0x3A].copy_from_slice(&0xEF53u16.to_le_bytes()); // magic
        data[0x4C..0x50].copy_from_slice(&1u32.to_le_bytes()); // rev_level
        data[0x58..0x5A].copy_from_slice(&128u16.to_le_bytes()); // inode_size
        data
    }

    #[test]
    fn parses_geometry() {
        let sb = Superblock::from_bytes(&raw_superblock()).unwrap();
        assert_eq!(sb.block_size(), 1024);
        assert_eq!(sb.num_groups(), 2);
        assert_eq!(sb.inode_size(), 128);
        assert_eq!(sb.to_json()["magic"], "0xef53");
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = raw_superblock();
        data[0x38] = 0x00;
        assert!(matches!(
            Superblock::from_bytes(&data),
            Err(Ext2Error::BadSuperblock(_))
        ));
    }

    #[test]
    fn old_revision_defaults_inode_size() {
        let mut data = raw_superblock();
        data[0x4C..0x50].copy_from_slice(&0u32.to_le_bytes());
        data[0x58..0x5A].copy_from_slice(&0u16.to_le_bytes());
        let sb = Superblock::from_bytes(&data).unwrap();
        assert_eq!(sb.inode_size(), 128);
    }
}
