//! Whole-volume type detection and path resolution (spec.md §4.1 "Mount
//! table and path resolution"), the piece the teacher never needed since
//! it only ever spoke FAT32: a tagged `Filesystem` enum stands in for the
//! source's per-kind function-name prefixes (`fat_*` vs `ext_*`), and the
//! resolver below matches on the tag once per path instead of dispatching
//! through a vtable (spec.md §9 "Polymorphism across filesystems").

use crate::device::BlockDevice;
use crate::error::Error;
use crate::ext::{self, ExtFs};
use crate::fat::{self, FatFs};

/// A mounted volume, tagged by the engine driving it.
#[derive(Debug)]
pub enum Filesystem {
    Fat(FatFs),
    Ext(ExtFs),
}

/// The result of walking a path down to its final component: the
/// decoded entry, still tagged by which engine produced it.
pub enum ResolvedEntry {
    Fat(fat::dir::DirEntry),
    Ext(ext::dir::DirEntry),
}

impl Filesystem {
    /// Detects and mounts whichever of FAT12/16/32 or the ext2/3/4 subset
    /// `dev` holds (spec.md §4 mount-time "type detection" step): a FAT
    /// volume is recognized by a valid boot-sector jump byte and BPB at
    /// sector 0, which `FatFs::mount` itself validates and rejects with
    /// `InvalidArgument` when absent; failing that, an ext superblock is
    /// tried at byte offset 1024.
    pub fn mount<Dev: BlockDevice>(dev: &mut Dev) -> Result<Self, Error<Dev::Error>> {
        match FatFs::mount(dev) {
            Ok(fat) => return Ok(Filesystem::Fat(fat)),
            Err(Error::InvalidArgument) => {}
            Err(e) => return Err(e),
        }
        ExtFs::mount(dev).map(Filesystem::Ext)
    }

    pub fn block_size(&self) -> usize {
        match self {
            Filesystem::Fat(fs) => fs.sector_size(),
            Filesystem::Ext(fs) => fs.block_size(),
        }
    }

    /// Walks `path` one `/`-separated component at a time from the
    /// volume's root, dispatching each lookup to the engine named by the
    /// tag. An empty path (root itself) is rejected with
    /// `InvalidArgument`; callers that need the root entry itself handle
    /// that case before calling this.
    pub fn resolve<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        buf: &mut [u8],
        path: &str,
    ) -> Result<ResolvedEntry, Error<Dev::Error>> {
        match self {
            Filesystem::Fat(fs) => {
                let mut dir = fs.root_dir();
                let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
                let mut found = None;
                while let Some(name) = components.next() {
                    let entry =
                        dir.find_by_name(dev, &fs.geometry, buf, name)?.ok_or(Error::NotFound)?;
                    if components.peek().is_some() {
                        if !entry.attributes.contains(fat::dir::Attributes::DIRECTORY) {
                            return Err(Error::NotFound);
                        }
                        dir = fat::dir::Directory::at_cluster(entry.first_cluster);
                    }
                    found = Some(entry);
                }
                found.map(ResolvedEntry::Fat).ok_or(Error::InvalidArgument)
            }
            Filesystem::Ext(fs) => {
                let mut inode = fs.root_inode(dev, buf)?;
                let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
                let mut found = None;
                while let Some(name) = components.next() {
                    let entry = ext::dir::find_entry(dev, &mut fs.superblock, buf, &mut inode, name)?
                        .ok_or(Error::NotFound)?;
                    if components.peek().is_some() {
                        if entry.file_type != ext::dir::FileType::Directory {
                            return Err(Error::NotFound);
                        }
                        inode = ext::inode::read_inode(dev, &fs.superblock, buf, entry.inode)?;
                    }
                    found = Some(entry);
                }
                found.map(ResolvedEntry::Ext).ok_or(Error::InvalidArgument)
            }
        }
    }
}
