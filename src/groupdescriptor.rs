use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One 32-byte ext2 block-group descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub bg_block_bitmap: u32,
    pub bg_inode_bitmap: u32,
    pub bg_inode_table: u32,
    pub bg_free_blocks_count: u16,
    pub bg_free_inodes_count: u16,
    pub bg_used_dirs_count: u16,
}

impl GroupDescriptor {
    /// Parses a group descriptor from a raw byte slice of at least 32 bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let le_u16 = |offset: usize| -> u16 {
            u16::from_le_bytes(data[offset..offset + 2].try_into().unwrap())
        };
        let le_u32 = |offset: usize| -> u32 {
            u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
        };

        GroupDescriptor {
            bg_block_bitmap: le_u32(0x00),
            bg_inode_bitmap: le_u32(0x04),
            bg_inode_table: le_u32(0x08),
            bg_free_blocks_count: le_u16(0x0C),
            bg_free_inodes_count: le_u16(0x0E),
            bg_used_dirs_count: le_u16(0x10),
        }
    }

    /// First block of this group's inode table.
    pub fn inode_table(&self) -> u32 {
        self.bg_inode_table
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({}))
    }
}
