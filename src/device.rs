//! The block device façade consumed by every higher layer (spec.md §6).
//!
//! This is deliberately the thinnest possible contract: `read`/`write` move
//! whole logical blocks, and `resize` is called exactly once, right after
//! the superblock is parsed, to tell the device what its logical block size
//! actually is (FAT's `bytes_per_sector`, ext's `1024 << s_log_block_size`).
//! Nothing above this layer assumes a fixed block size at compile time,
//! which is why (unlike the teacher's `Storage` trait) this is not generic
//! over a `typenum` sector size: a single process may have a FAT12 floppy
//! and an ext4 disk mounted at once, each with its own block size.

use core::fmt::Debug;

/// A polymorphic block device: something that can read and write fixed-size
/// logical blocks addressed by LBA, and be told what that block size is.
pub trait BlockDevice {
    type Error: Debug;

    /// Reads `count` logical blocks starting at `lba` into `buffer`.
    /// `buffer` must be at least `count * block_size` bytes.
    fn read(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), Self::Error>;

    /// Writes `count` logical blocks starting at `lba` from `buffer`.
    fn write(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), Self::Error>;

    /// Reconfigures the device's internal buffering to present
    /// `block_size`-byte logical blocks. Called once, after the mounting
    /// engine has read and validated the superblock/BPB.
    fn resize(&mut self, block_size: u32) -> Result<(), Self::Error>;
}

using_std! {
    /// A `BlockDevice` backed by a plain file, for hosted image testing
    /// (spec.md §1: "the library targets hosted programs (for image
    /// testing)"). Reads/writes are unbuffered past the OS page cache;
    /// spec.md's single-sector-buffer caching lives in the engines, not
    /// here.
    pub struct FileBackedDevice {
        file: std::fs::File,
        block_size: u32,
    }

    impl FileBackedDevice {
        pub fn open(path: &std::path::Path) -> std::io::Result<Self> {
            let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
            Ok(Self { file, block_size: 512 })
        }
    }

    impl BlockDevice for FileBackedDevice {
        type Error = std::io::Error;

        fn read(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), Self::Error> {
            use std::io::{Read, Seek, SeekFrom};
            let len = (count as usize) * (self.block_size as usize);
            self.file.seek(SeekFrom::Start(lba * self.block_size as u64))?;
            self.file.read_exact(&mut buffer[..len])
        }

        fn write(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), Self::Error> {
            use std::io::{Seek, SeekFrom, Write};
            let len = (count as usize) * (self.block_size as usize);
            self.file.seek(SeekFrom::Start(lba * self.block_size as u64))?;
            self.file.write_all(&buffer[..len])
        }

        fn resize(&mut self, block_size: u32) -> Result<(), Self::Error> {
            self.block_size = block_size;
            Ok(())
        }
    }
}
