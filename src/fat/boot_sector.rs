//! The BIOS Parameter Block and the geometry derived from it
//! (spec.md §4.2 "Superblock / BPB"), sourced from the same field layout
//! the teacher's original single-sector-size BPB reader used, generalized
//! to the three widths and to a runtime `bytes_per_sector`.

use super::types::FatType;
use crate::error::Error;

use core::convert::TryInto;

/// The on-disk BIOS Parameter Block, common DOS 2.0/3.31 fields plus the
/// FAT32-only extension block. `read` fills in whichever of `root_cluster`
/// / `fat_size_32` apply; FAT12/16 volumes leave them at 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,

    // FAT32 extension (all zero on FAT12/16):
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
}

impl BiosParameterBlock {
    /// Reads and validates the BPB out of sector 0. `sector` must be at
    /// least 90 bytes (covers the FAT32 extension through `root_cluster`).
    pub fn read<D: core::fmt::Debug>(sector: &[u8]) -> Result<Self, Error<D>> {
        if sector.len() < 90 {
            return Err(Error::InvalidArgument);
        }

        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(
                    sector[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap(),
                )
            };
        }

        // Jump instruction: either a short jump (0xEB, ??, 0x90) or a near
        // jump (0xE9, ??, ??); both are in common use by FAT formatters.
        let jump_ok = sector[0] == 0xEB || sector[0] == 0xE9;
        if !jump_ok {
            return Err(Error::InvalidArgument);
        }

        let bpb = Self {
            bytes_per_sector: e!(u16, 0x0B),
            sectors_per_cluster: sector[0x0D],
            reserved_sector_count: e!(u16, 0x0E),
            num_fats: sector[0x10],
            root_entry_count: e!(u16, 0x11),
            total_sectors_16: e!(u16, 0x13),
            media: sector[0x15],
            fat_size_16: e!(u16, 0x16),
            sectors_per_track: e!(u16, 0x18),
            num_heads: e!(u16, 0x1A),
            hidden_sectors: e!(u32, 0x1C),
            total_sectors_32: e!(u32, 0x20),

            fat_size_32: e!(u32, 0x24),
            ext_flags: e!(u16, 0x28),
            fs_version: e!(u16, 0x2A),
            root_cluster: e!(u32, 0x2C),
        };

        bpb.validate()?;
        Ok(bpb)
    }

    fn validate<D: core::fmt::Debug>(&self) -> Result<(), Error<D>> {
        if !matches!(self.bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(Error::InvalidArgument);
        }
        if self.sectors_per_cluster == 0 || !self.sectors_per_cluster.is_power_of_two() {
            return Err(Error::InvalidArgument);
        }
        if self.num_fats == 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    pub fn fat_size(&self) -> u32 {
        if self.fat_size_16 != 0 {
            self.fat_size_16 as u32
        } else {
            self.fat_size_32
        }
    }

    pub fn total_sectors(&self) -> u32 {
        if self.total_sectors_16 != 0 {
            self.total_sectors_16 as u32
        } else {
            self.total_sectors_32
        }
    }

    pub fn root_dir_sectors(&self) -> u32 {
        let bytes = self.root_entry_count as u32 * 32;
        (bytes + self.bytes_per_sector as u32 - 1) / self.bytes_per_sector as u32
    }

    pub fn first_fat_sector(&self) -> u32 {
        self.reserved_sector_count as u32
    }

    pub fn first_root_dir_sector(&self) -> u32 {
        self.first_fat_sector() + self.num_fats as u32 * self.fat_size()
    }

    pub fn first_data_sector(&self) -> u32 {
        self.first_root_dir_sector() + self.root_dir_sectors()
    }

    pub fn total_clusters(&self) -> u32 {
        let data_sectors = self.total_sectors().saturating_sub(self.first_data_sector());
        data_sectors / self.sectors_per_cluster as u32
    }

    pub fn fat_type(&self) -> FatType {
        FatType::classify(self.total_clusters())
    }
}
