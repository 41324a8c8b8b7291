//! The FAT file handle: read/write/seek/truncate/close
//! (spec.md §4.2 "File read/write" and "Close semantics"), descended from
//! the teacher's `FileWrapper` skeleton but filled in against the
//! generalized `fat::table` cluster-chain API instead of the abandoned
//! cache-backed `Storage` trait.

use super::dir::{Attributes, Directory, DirLocation, EntryLocator};
use super::table::{self, Cluster, FatGeometry};
use crate::device::BlockDevice;
use crate::error::Error;
use crate::flags::OpenFlags;

/// An open FAT file. Carries its containing directory's locator by value
/// (spec.md REDESIGN FLAGS "Cyclic directory/file relationship"), not a
/// pointer back to a `Directory`, so renaming/closing never risks a stale
/// reference.
pub struct File {
    pub first_cluster: Cluster,
    pub size: u32,
    pub position: u32,
    pub flags: OpenFlags,

    pub dir_location: DirLocation,
    pub locator: EntryLocator,
    pub short_name: [u8; 11],
    pub attributes: Attributes,

    metadata_dirty: bool,
}

impl File {
    pub fn new(
        first_cluster: Cluster,
        size: u32,
        flags: OpenFlags,
        dir_location: DirLocation,
        locator: EntryLocator,
        short_name: [u8; 11],
        attributes: Attributes,
    ) -> Self {
        Self {
            first_cluster,
            size,
            position: if flags.contains(OpenFlags::APPEND) { size } else { 0 },
            flags,
            dir_location,
            locator,
            short_name,
            attributes,
            metadata_dirty: false,
        }
    }

    pub fn tell(&self) -> u32 {
        self.position
    }

    pub fn seek(&mut self, position: u32) {
        self.position = position;
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Reads up to `out.len()` bytes starting at the current position,
    /// stopping at end-of-chain or end-of-file, whichever comes first.
    pub fn read<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        out: &mut [u8],
    ) -> Result<usize, Error<Dev::Error>> {
        if !self.flags.is_read() {
            return Err(Error::InvalidArgument);
        }
        if self.first_cluster < 2 {
            return Ok(0);
        }

        let remaining_in_file = self.size.saturating_sub(self.position) as usize;
        let want = out.len().min(remaining_in_file);

        let mut done = 0;
        let mut cached_sector: Option<u64> = None;
        while done < want {
            let pos = self.position as u32 + done as u32;
            let (sector, offset) = self.locate(geo, dev, buf, pos)?;

            if cached_sector != Some(sector) {
                dev.read(sector, 1, buf)?;
                cached_sector = Some(sector);
            }

            let sector_size = geo.bytes_per_sector as usize;
            let chunk = (sector_size - offset as usize).min(want - done);
            out[done..done + chunk].copy_from_slice(&buf[offset as usize..offset as usize + chunk]);
            done += chunk;
        }

        self.position += done as u32;
        Ok(done)
    }

    /// Writes `data` at the current position, extending the chain (and
    /// `size`) as needed (spec.md: "Write extends the chain via
    /// allocation when position passes the current end").
    pub fn write<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        data: &[u8],
    ) -> Result<usize, Error<Dev::Error>> {
        if !self.flags.is_write() {
            return Err(Error::InvalidArgument);
        }

        if self.first_cluster < 2 {
            self.first_cluster = table::allocate_chain(dev, geo, buf, 1, None)?;
        }

        let mut done = 0;
        while done < data.len() {
            let pos = self.position + done as u32;
            let (sector, offset) = self.locate_for_write(geo, dev, buf, pos)?;

            dev.read(sector, 1, buf)?;
            let sector_size = geo.bytes_per_sector as usize;
            let chunk = (sector_size - offset as usize).min(data.len() - done);
            buf[offset as usize..offset as usize + chunk].copy_from_slice(&data[done..done + chunk]);
            dev.write(sector, 1, buf)?;

            done += chunk;
        }

        self.position += done as u32;
        if self.position > self.size {
            self.size = self.position;
        }
        self.metadata_dirty = true;
        Ok(done)
    }

    /// Shrinks or grows the file to `new_size`. Growing zero-fills and
    /// allocates as needed; shrinking deallocates the now-unused tail of
    /// the chain.
    pub fn truncate<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        new_size: u32,
    ) -> Result<(), Error<Dev::Error>> {
        if !self.flags.is_write() {
            return Err(Error::InvalidArgument);
        }

        let cluster_bytes = geo.cluster_bytes();
        if new_size < self.size {
            let clusters_needed = if new_size == 0 { 0 } else { (new_size - 1) / cluster_bytes + 1 };
            if clusters_needed == 0 {
                if self.first_cluster >= 2 {
                    table::deallocate_chain(dev, geo, buf, self.first_cluster)?;
                    self.first_cluster = 0;
                }
            } else if self.first_cluster >= 2 {
                if let Some(last_kept) =
                    table::get_by_num(dev, geo, buf, self.first_cluster, clusters_needed - 1)?
                {
                    if let Some(first_freed) = table::next(dev, geo, buf, last_kept)? {
                        table::deallocate_chain(dev, geo, buf, first_freed)?;
                    }
                    table::set_eof(dev, geo, buf, last_kept)?;
                }
            }
        }

        self.size = new_size;
        if self.position > new_size {
            self.position = new_size;
        }
        self.metadata_dirty = true;
        Ok(())
    }

    /// Flushes the directory entry's size/first-cluster fields, then
    /// returns; the device buffer itself is already synchronous on every
    /// write (spec.md "Close semantics").
    pub fn close<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
    ) -> Result<(), Error<Dev::Error>> {
        if self.metadata_dirty {
            let dir = Directory { location: self.dir_location };
            dir.update_entry(
                dev,
                geo,
                buf,
                self.locator,
                &self.short_name,
                self.attributes,
                self.first_cluster,
                self.size,
            )?;
            self.metadata_dirty = false;
        }
        Ok(())
    }

    fn locate<Dev: BlockDevice>(
        &self,
        geo: &FatGeometry,
        dev: &mut Dev,
        buf: &mut [u8],
        pos: u32,
    ) -> Result<(u64, u32), Error<Dev::Error>> {
        let cluster_bytes = geo.cluster_bytes();
        let cluster_index = pos / cluster_bytes;
        let offset_in_cluster = pos % cluster_bytes;

        let cluster = table::get_by_num(dev, geo, buf, self.first_cluster, cluster_index)?
            .ok_or(Error::Fault)?;
        let sector_size = geo.bytes_per_sector as u32;
        let sector = geo.cluster_to_lba(cluster) + (offset_in_cluster / sector_size) as u64;
        Ok((sector, offset_in_cluster % sector_size))
    }

    /// Like `locate`, but allocates new clusters onto the chain when `pos`
    /// falls past the current end (spec.md "Write extends the chain").
    fn locate_for_write<Dev: BlockDevice>(
        &mut self,
        geo: &FatGeometry,
        dev: &mut Dev,
        buf: &mut [u8],
        pos: u32,
    ) -> Result<(u64, u32), Error<Dev::Error>> {
        let cluster_bytes = geo.cluster_bytes();
        let cluster_index = pos / cluster_bytes;
        let offset_in_cluster = pos % cluster_bytes;

        let cluster = match table::get_by_num(dev, geo, buf, self.first_cluster, cluster_index)? {
            Some(c) => c,
            None => {
                let last = self.last_cluster(dev, geo, buf)?;
                table::allocate_chain(dev, geo, buf, 1, Some(last))?
            }
        };

        let sector_size = geo.bytes_per_sector as u32;
        let sector = geo.cluster_to_lba(cluster) + (offset_in_cluster / sector_size) as u64;
        Ok((sector, offset_in_cluster % sector_size))
    }

    fn last_cluster<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
    ) -> Result<Cluster, Error<Dev::Error>> {
        let mut cur = self.first_cluster;
        while let Some(n) = table::next(dev, geo, buf, cur)? {
            cur = n;
        }
        Ok(cur)
    }
}
