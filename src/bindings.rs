//! C bindings for this crate, for embedding in a firmware image that talks
//! to its storage hardware through a small `eDisk_*` driver shim rather
//! than Rust's own `std::fs::File` (spec.md §4 "freestanding-friendly":
//! the crate's core logic never assumes an allocator or an OS, so the only
//! thing this module adds is a `BlockDevice` impl wired to `extern "C"`
//! calls instead of syscalls).

pub mod edisk {
    use crate::device::BlockDevice;

    const SECTOR_SIZE: usize = 512;

    #[repr(C)]
    pub struct EDiskStorage {
        pub drive_num: u8,
        pub size_in_sectors: u64,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub enum DResult {
        /// Successful
        ResOk = 0,
        /// R/W error
        ResError = 1,
        /// Write protected
        ResWrPrt = 2,
        /// Not ready
        ResNotRdy = 3,
        /// Invalid parameter
        ResParErr = 4,
    }

    extern "C" {
        fn eDisk_Read(drv: u8, buff: *mut u8, sector: u32, count: u32) -> DResult;
        fn eDisk_Write(drv: u8, buff: *const u8, sector: u32, count: u32) -> DResult;
    }

    impl BlockDevice for EDiskStorage {
        type Error = DResult;

        fn read(&mut self, lba: u64, count: u32, buffer: &mut [u8]) -> Result<(), DResult> {
            if lba + count as u64 > self.size_in_sectors {
                return Err(DResult::ResParErr);
            }
            match unsafe { eDisk_Read(self.drive_num, buffer.as_mut_ptr(), lba as u32, count) } {
                DResult::ResOk => Ok(()),
                e => Err(e),
            }
        }

        fn write(&mut self, lba: u64, count: u32, buffer: &[u8]) -> Result<(), DResult> {
            if lba + count as u64 > self.size_in_sectors {
                return Err(DResult::ResParErr);
            }
            match unsafe { eDisk_Write(self.drive_num, buffer.as_ptr(), lba as u32, count) } {
                DResult::ResOk => Ok(()),
                e => Err(e),
            }
        }

        fn resize(&mut self, block_size: u32) -> Result<(), DResult> {
            // The hardware only ever speaks fixed 512-byte sectors; any
            // other block size means the mounted volume doesn't fit this
            // device.
            if block_size as usize == SECTOR_SIZE {
                Ok(())
            } else {
                Err(DResult::ResParErr)
            }
        }
    }
}

#[no_mangle]
pub extern "C" fn new_edisk_storage(drive_num: u8, size_in_sectors: u64) -> edisk::EDiskStorage {
    edisk::EDiskStorage { drive_num, size_in_sectors }
}

#[no_mangle]
pub extern "C" fn edisk_sector_checksum(storage: &mut edisk::EDiskStorage, sector_num: u32) -> u64 {
    use crate::device::BlockDevice;

    if sector_num as u64 >= storage.size_in_sectors {
        return 0;
    }

    let mut sector = [0u8; 512];
    if storage.read(sector_num as u64, 1, &mut sector).is_err() {
        return 0;
    }

    sector.iter().fold(0u64, |checksum, &byte| checksum.wrapping_add(byte as u64))
}
