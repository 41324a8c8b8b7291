//! Link management (spec.md §4.3 "Hardlink / unlink"), grounded on
//! `original_source/ext/inode.h`'s `ext_inode_deallocate` (invoked once a
//! link count reaches zero) composed with the entry insertion/removal in
//! `dir.rs`.

use super::dir::{self, FileType};
use super::inode::{self, Inode};
use super::superblock::Superblock;
use crate::device::BlockDevice;
use crate::error::Error;

/// Adds a new directory entry for `inode` under `parent`, incrementing
/// the target inode's link count.
pub fn link<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    parent: &mut Inode,
    name: &str,
    target_inode_num: u32,
    target: &mut Inode,
) -> Result<(), Error<Dev::Error>> {
    if dir::find_entry(dev, sb, buf, parent, name)?.is_some() {
        return Err(Error::AlreadyExists);
    }

    let file_type = if target.is_dir() { FileType::Directory } else { FileType::Regular };
    dir::insert_entry(dev, sb, buf, parent, name, target_inode_num, file_type)?;

    target.links_count += 1;
    inode::write_inode(dev, sb, buf, target_inode_num, target)
}

/// Removes `name` from `parent`, decrementing the target's link count and
/// freeing its inode and data blocks once the count (and any still-open
/// handle, tracked by the caller) reaches zero.
///
/// `open_handles` is the number of file handles the caller still has open
/// on this inode; deallocation is deferred (spec.md "unlink of an
/// open file") until both the link count and the open-handle count are
/// zero.
pub fn unlink<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    parent: &mut Inode,
    name: &str,
    open_handles: u32,
) -> Result<(), Error<Dev::Error>> {
    let entry = dir::find_entry(dev, sb, buf, parent, name)?.ok_or(Error::NotFound)?;

    if !dir::remove_entry(dev, sb, buf, parent, name)? {
        return Err(Error::NotFound);
    }

    let mut target = inode::read_inode(dev, sb, buf, entry.inode)?;
    target.links_count = target.links_count.saturating_sub(1);

    if target.links_count == 0 && open_handles == 0 {
        inode::deallocate(dev, sb, buf, entry.inode, &target)?;
    } else {
        inode::write_inode(dev, sb, buf, entry.inode, &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::blockgroup::{self, BlockGroupDescriptor};
    use crate::ext::superblock::MAGIC;
    use assert_eq as eq;

    #[derive(Debug)]
    struct Mem {
        blocks: std::vec::Vec<[u8; 1024]>,
    }
    impl Mem {
        fn new(n: usize) -> Self {
            Self { blocks: std::vec![[0u8; 1024]; n] }
        }
    }
    impl BlockDevice for Mem {
        type Error = core::convert::Infallible;
        fn read(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), Self::Error> {
            for i in 0..count as usize {
                buffer[i * 1024..(i + 1) * 1024].copy_from_slice(&self.blocks[lba as usize + i]);
            }
            Ok(())
        }
        fn write(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), Self::Error> {
            for i in 0..count as usize {
                self.blocks[lba as usize + i].copy_from_slice(&buffer[i * 1024..(i + 1) * 1024]);
            }
            Ok(())
        }
        fn resize(&mut self, _block_size: u32) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn sb() -> Superblock {
        Superblock {
            inodes_count: 128,
            blocks_count: 4096,
            free_blocks_count: 4000,
            free_inodes_count: 120,
            first_data_block: 20,
            log_block_size: 0,
            blocks_per_group: 4096,
            inodes_per_group: 128,
            magic: MAGIC,
            state: 1,
            rev_level: 1,
            first_inode: 11,
            inode_size: 128,
            feature_compat: 0,
            feature_incompat: 0,
            feature_ro_compat: 0,
        }
    }

    fn seed(dev: &mut Mem, sb: &Superblock) {
        let desc = BlockGroupDescriptor {
            block_bitmap: 4,
            inode_bitmap: 5,
            inode_table: 6,
            free_blocks_count: sb.free_blocks_count as u16,
            free_inodes_count: sb.free_inodes_count as u16,
            used_dirs_count: 0,
        };
        let mut buf = [0u8; 1024];
        blockgroup::write(dev, sb, &mut buf, 0, &desc).unwrap();
    }

    #[test]
    fn link_increments_count_unlink_decrements_and_frees_at_zero() {
        let mut dev = Mem::new(64);
        let mut sb = sb();
        seed(&mut dev, &sb);
        let mut buf = [0u8; 1024];

        let mut parent = Inode::new_dir(0o755);
        let (file_num, mut file) = inode::allocate(&mut dev, &mut sb, &mut buf, false, 0o644).unwrap();

        link(&mut dev, &mut sb, &mut buf, &mut parent, "a.txt", file_num, &mut file).unwrap();
        eq!(file.links_count, 1);

        link(&mut dev, &mut sb, &mut buf, &mut parent, "b.txt", file_num, &mut file).unwrap();
        eq!(file.links_count, 2);

        unlink(&mut dev, &mut sb, &mut buf, &mut parent, "a.txt", 0).unwrap();
        let reread = inode::read_inode(&mut dev, &sb, &mut buf, file_num).unwrap();
        eq!(reread.links_count, 1);

        let free_before = sb.free_inodes_count;
        unlink(&mut dev, &mut sb, &mut buf, &mut parent, "b.txt", 0).unwrap();
        eq!(sb.free_inodes_count, free_before + 1);
    }

    #[test]
    fn unlink_of_open_file_defers_deallocation() {
        let mut dev = Mem::new(64);
        let mut sb = sb();
        seed(&mut dev, &sb);
        let mut buf = [0u8; 1024];

        let mut parent = Inode::new_dir(0o755);
        let (file_num, mut file) = inode::allocate(&mut dev, &mut sb, &mut buf, false, 0o644).unwrap();
        link(&mut dev, &mut sb, &mut buf, &mut parent, "a.txt", file_num, &mut file).unwrap();

        let free_before = sb.free_inodes_count;
        unlink(&mut dev, &mut sb, &mut buf, &mut parent, "a.txt", 1).unwrap();
        eq!(sb.free_inodes_count, free_before);

        let reread = inode::read_inode(&mut dev, &sb, &mut buf, file_num).unwrap();
        eq!(reread.links_count, 0);
    }
}
