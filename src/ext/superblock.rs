//! The ext2/3/4 superblock (spec.md §4.3 "Superblock"), field layout
//! grounded on the standard 1024-byte ext2 superblock (cross-checked
//! against the public ext2 port in `other_examples/01a0eee4_pi-pi3-ext2-rs`)
//! since the upstream bolthur/bfs C headers only declare accessor
//! functions, not the struct layout itself.

use crate::error::Error;
use core::convert::TryInto;

pub const MAGIC: u16 = 0xEF53;
pub const SUPERBLOCK_OFFSET: u64 = 1024;

/// `s_feature_incompat` bits this engine cannot safely read/write
/// (spec.md SPEC_FULL §4 resolution 2): extents, 64-bit, meta_bg.
pub const INCOMPAT_UNSUPPORTED: u32 = 0x40 | 0x80 | 0x10;

/// Sparse superblock backups live only on power-of-3/5/7 groups (plus
/// group 1); without this feature every group carries a backup.
pub const FEATURE_RO_SPARSE_SUPER: u32 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Superblock {
    pub inodes_count: u32,
    pub blocks_count: u32,
    pub free_blocks_count: u32,
    pub free_inodes_count: u32,
    pub first_data_block: u32,
    pub log_block_size: u32,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub magic: u16,
    pub state: u16,
    pub rev_level: u32,
    pub first_inode: u32,
    pub inode_size: u16,
    pub feature_compat: u32,
    pub feature_incompat: u32,
    pub feature_ro_compat: u32,
}

impl Superblock {
    pub fn read<D: core::fmt::Debug>(block: &[u8]) -> Result<Self, Error<D>> {
        if block.len() < 264 {
            return Err(Error::InvalidArgument);
        }

        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(block[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap())
            };
        }

        let sb = Self {
            inodes_count: e!(u32, 0),
            blocks_count: e!(u32, 4),
            free_blocks_count: e!(u32, 12),
            free_inodes_count: e!(u32, 16),
            first_data_block: e!(u32, 20),
            log_block_size: e!(u32, 24),
            blocks_per_group: e!(u32, 32),
            inodes_per_group: e!(u32, 40),
            magic: e!(u16, 56),
            state: e!(u16, 58),
            rev_level: e!(u32, 76),
            first_inode: e!(u32, 84),
            inode_size: e!(u16, 88),
            feature_compat: if e!(u32, 76) >= 1 { e!(u32, 92) } else { 0 },
            feature_incompat: if e!(u32, 76) >= 1 { e!(u32, 96) } else { 0 },
            feature_ro_compat: if e!(u32, 76) >= 1 { e!(u32, 100) } else { 0 },
        };

        sb.validate()?;
        Ok(sb)
    }

    fn validate<D: core::fmt::Debug>(&self) -> Result<(), Error<D>> {
        if self.magic != MAGIC {
            return Err(Error::InvalidArgument);
        }
        if self.inodes_per_group == 0 || self.blocks_per_group == 0 {
            return Err(Error::InvalidArgument);
        }
        if self.log_block_size > 3 {
            return Err(Error::NotSupported);
        }
        if self.feature_incompat & INCOMPAT_UNSUPPORTED != 0 {
            return Err(Error::NotSupported);
        }
        Ok(())
    }

    pub fn block_size(&self) -> u32 {
        1024 << self.log_block_size
    }

    pub fn inode_size(&self) -> u32 {
        if self.rev_level == 0 {
            128
        } else {
            self.inode_size as u32
        }
    }

    pub fn block_group_count(&self) -> u32 {
        let by_blocks = (self.blocks_count - self.first_data_block + self.blocks_per_group - 1)
            / self.blocks_per_group;
        let by_inodes = (self.inodes_count + self.inodes_per_group - 1) / self.inodes_per_group;
        debug_assert_eq!(by_blocks, by_inodes);
        by_blocks
    }

    pub fn sparse_super(&self) -> bool {
        self.feature_ro_compat & FEATURE_RO_SPARSE_SUPER != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;

    fn minimal_block(blocks_count: u32, inodes_per_group: u32, blocks_per_group: u32) -> [u8; 1024] {
        let mut b = [0u8; 1024];
        b[0..4].copy_from_slice(&1024u32.to_le_bytes()); // inodes_count
        b[4..8].copy_from_slice(&blocks_count.to_le_bytes());
        b[32..36].copy_from_slice(&blocks_per_group.to_le_bytes());
        b[40..44].copy_from_slice(&inodes_per_group.to_le_bytes());
        b[56..58].copy_from_slice(&MAGIC.to_le_bytes());
        b[88..90].copy_from_slice(&128u16.to_le_bytes());
        b
    }

    #[test]
    fn rejects_bad_magic() {
        let mut b = minimal_block(8192, 1024, 8192);
        b[56..58].copy_from_slice(&0u16.to_le_bytes());
        assert!(Superblock::read::<core::convert::Infallible>(&b).is_err());
    }

    #[test]
    fn reads_block_size_from_log_block_size() {
        let mut b = minimal_block(8192, 1024, 8192);
        b[24..28].copy_from_slice(&2u32.to_le_bytes()); // log_block_size = 2 -> 4096
        let sb = Superblock::read::<core::convert::Infallible>(&b).unwrap();
        eq!(sb.block_size(), 4096);
    }

    #[test]
    fn rejects_unsupported_incompat_features() {
        let mut b = minimal_block(8192, 1024, 8192);
        b[76..80].copy_from_slice(&1u32.to_le_bytes()); // rev_level = dynamic
        b[96..100].copy_from_slice(&0x40u32.to_le_bytes()); // extents
        let err = Superblock::read::<core::convert::Infallible>(&b).unwrap_err();
        eq!(err, Error::NotSupported);
    }

    #[test]
    fn block_group_count_accounts_for_first_data_block() {
        // 1024-byte-block volume: superblock occupies block 1, so
        // first_data_block == 1. A single group of 8192 blocks can hold
        // blocks_count = 8193 (1 reserved + 8192 data blocks), not 2 groups.
        let mut b = minimal_block(8193, 1024, 8192);
        b[20..24].copy_from_slice(&1u32.to_le_bytes()); // first_data_block
        let sb = Superblock::read::<core::convert::Infallible>(&b).unwrap();
        eq!(sb.block_group_count(), 1);
    }

    #[test]
    fn rejects_oversized_block_size() {
        let mut b = minimal_block(8192, 1024, 8192);
        b[24..28].copy_from_slice(&4u32.to_le_bytes()); // log_block_size = 4 -> 16384
        let err = Superblock::read::<core::convert::Infallible>(&b).unwrap_err();
        eq!(err, Error::NotSupported);
    }
}
