use thiserror::Error;

/// Failures raised while exhuming an ext2 image.
///
/// Ghost-referenced inode reads and indirect-block reads never surface here;
/// they are recovered in place (zeroed record / skipped block) because ghost
/// evidence is best-effort.
#[derive(Debug, Error)]
pub enum Ext2Error {
    #[error("image i/o error: {0}")]
    Image(#[from] std::io::Error),

    #[error("bad superblock: {0}")]
    BadSuperblock(String),

    #[error("invalid inode {0}")]
    InvalidInode(u32),

    #[error("block {0} out of range")]
    BlockOutOfRange(u32),
}

pub type Result<T> = std::result::Result<T, Ext2Error>;
