//! An open ext file handle: read/write/seek/truncate/close, mirroring
//! `fat::file::File`'s shape but walking inode block pointers via
//! `indirection`/`inode` instead of a FAT cluster chain.

use super::inode::{self, Inode};
use super::superblock::Superblock;
use crate::device::BlockDevice;
use crate::error::Error;
use crate::flags::OpenFlags;

pub struct File {
    pub inode_number: u32,
    pub inode: Inode,
    pub position: u32,
    pub flags: OpenFlags,
    metadata_dirty: bool,
}

impl File {
    pub fn new(inode_number: u32, inode: Inode, flags: OpenFlags) -> Self {
        let position = if flags.contains(OpenFlags::APPEND) { inode.size } else { 0 };
        Self { inode_number, inode, position, flags, metadata_dirty: false }
    }

    pub fn tell(&self) -> u32 {
        self.position
    }

    pub fn seek(&mut self, position: u32) {
        self.position = position;
    }

    pub fn size(&self) -> u32 {
        self.inode.size
    }

    pub fn read<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        sb: &mut Superblock,
        buf: &mut [u8],
        out: &mut [u8],
    ) -> Result<usize, Error<Dev::Error>> {
        if !self.flags.is_read() {
            return Err(Error::InvalidArgument);
        }

        let block_size = sb.block_size();
        let remaining_in_file = self.inode.size.saturating_sub(self.position) as usize;
        let want = out.len().min(remaining_in_file);

        let mut done = 0;
        let mut scratch = [0u8; 8192];
        while done < want {
            let pos = self.position + done as u32;
            let lb = pos / block_size;
            let offset = (pos % block_size) as usize;

            inode::read_block(dev, sb, buf, &mut self.inode, lb, &mut scratch[..block_size as usize])?;
            let chunk = (block_size as usize - offset).min(want - done);
            out[done..done + chunk].copy_from_slice(&scratch[offset..offset + chunk]);
            done += chunk;
        }

        self.position += done as u32;
        Ok(done)
    }

    pub fn write<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        sb: &mut Superblock,
        buf: &mut [u8],
        data: &[u8],
    ) -> Result<usize, Error<Dev::Error>> {
        if !self.flags.is_write() {
            return Err(Error::InvalidArgument);
        }

        let block_size = sb.block_size();
        let mut done = 0;
        let mut scratch = [0u8; 8192];
        while done < data.len() {
            let pos = self.position + done as u32;
            let lb = pos / block_size;
            let offset = (pos % block_size) as usize;
            let chunk = (block_size as usize - offset).min(data.len() - done);

            if chunk < block_size as usize {
                inode::read_block(dev, sb, buf, &mut self.inode, lb, &mut scratch[..block_size as usize])?;
            }
            scratch[offset..offset + chunk].copy_from_slice(&data[done..done + chunk]);
            inode::write_block(dev, sb, buf, &mut self.inode, lb, &scratch[..block_size as usize])?;

            done += chunk;
        }

        self.position += done as u32;
        if self.position > self.inode.size {
            self.inode.size = self.position;
        }
        self.metadata_dirty = true;
        Ok(done)
    }

    pub fn truncate<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        sb: &mut Superblock,
        buf: &mut [u8],
        new_size: u32,
    ) -> Result<(), Error<Dev::Error>> {
        if !self.flags.is_write() {
            return Err(Error::InvalidArgument);
        }

        let block_size = sb.block_size();
        if new_size < self.inode.size {
            let keep_blocks = (new_size + block_size - 1) / block_size;
            let total_blocks = (self.inode.size + block_size - 1) / block_size;
            for lb in keep_blocks..total_blocks {
                if let Some(physical) =
                    inode::get_block_offset(dev, sb, buf, &mut self.inode, lb, super::indirection::Allocate::No)?
                {
                    super::alloc::free_block(dev, sb, buf, physical)?;
                }
            }
        }

        self.inode.size = new_size;
        if self.position > new_size {
            self.position = new_size;
        }
        self.metadata_dirty = true;
        Ok(())
    }

    pub fn close<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        sb: &mut Superblock,
        buf: &mut [u8],
    ) -> Result<(), Error<Dev::Error>> {
        if self.metadata_dirty {
            inode::write_inode(dev, sb, buf, self.inode_number, &self.inode)?;
            self.metadata_dirty = false;
        }
        Ok(())
    }
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
    fn write_then_read_back_spanning_multiple_blocks() {
        let mut dev = Mem::new(64);
        let mut sb = sb();
        seed(&mut dev, &sb);
        let mut buf = [0u8; 1024];

        let (num, data) = inode::allocate(&mut dev, &mut sb, &mut buf, false, 0o644).unwrap();
        let mut file = File::new(num, data, OpenFlags::READ | OpenFlags::WRITE);

        let pattern = [0x5Au8; 2048];
        let written = file.write(&mut dev, &mut sb, &mut buf, &pattern).unwrap();
        eq!(written, 2048);

        file.seek(0);
        let mut out = [0u8; 2048];
        let read = file.read(&mut dev, &mut sb, &mut buf, &mut out).unwrap();
        eq!(read, 2048);
        assert!(out.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn truncate_shrinks_and_frees_blocks() {
        let mut dev = Mem::new(64);
        let mut sb = sb();
        seed(&mut dev, &sb);
        let mut buf = [0u8; 1024];

        let (num, data) = inode::allocate(&mut dev, &mut sb, &mut buf, false, 0o644).unwrap();
        let mut file = File::new(num, data, OpenFlags::READ | OpenFlags::WRITE);
        file.write(&mut dev, &mut sb, &mut buf, &[1u8; 2048]).unwrap();

        let free_before = sb.free_blocks_count;
        file.truncate(&mut dev, &mut sb, &mut buf, 1024).unwrap();
        assert!(sb.free_blocks_count > free_before);
        eq!(file.size(), 1024);
    }
}
