//! Inode read/write and the block-level read/write/allocate operations
//! built on top of `indirection` (spec.md §4.3 "Inodes"), grounded on
//! `original_source/ext/inode.h`'s declared surface
//! (`ext_inode_read_inode`/`write_inode`, `ext_inode_read_block`/
//! `write_block`, `ext_inode_get_block_offset`, `ext_inode_allocate`,
//! `ext_inode_deallocate_block_recursive`, `ext_inode_deallocate`) against
//! the standard 128-byte ext2 on-disk inode layout.

use super::alloc;
use super::blockgroup;
use super::indirection::{self, Allocate};
use super::superblock::Superblock;
use crate::device::BlockDevice;
use crate::error::Error;
use core::convert::TryInto;

pub const INODE_ROOT: u32 = 2;

pub const MODE_DIR: u16 = 0x4000;
pub const MODE_FILE: u16 = 0x8000;
pub const MODE_SYMLINK: u16 = 0xA000;
const MODE_TYPE_MASK: u16 = 0xF000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub size: u32,
    pub atime: u32,
    pub ctime: u32,
    pub mtime: u32,
    pub dtime: u32,
    pub links_count: u16,
    pub blocks: u32,
    pub block: [u32; 15],
}

impl Inode {
    pub fn is_dir(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_DIR
    }

    pub fn is_file(&self) -> bool {
        self.mode & MODE_TYPE_MASK == MODE_FILE
    }

    fn decode(raw: &[u8]) -> Self {
        macro_rules! e {
            ($ty:tt, $offset:literal) => {
                $ty::from_le_bytes(raw[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap())
            };
        }
        let mut block = [0u32; 15];
        for (i, slot) in block.iter_mut().enumerate() {
            *slot = u32::from_le_bytes(raw[40 + i * 4..44 + i * 4].try_into().unwrap());
        }
        Self {
            mode: e!(u16, 0),
            uid: e!(u16, 2),
            size: e!(u32, 4),
            atime: e!(u32, 8),
            ctime: e!(u32, 12),
            mtime: e!(u32, 16),
            dtime: e!(u32, 20),
            gid: e!(u16, 24),
            links_count: e!(u16, 26),
            blocks: e!(u32, 28),
            block,
        }
    }

    fn encode(&self, raw: &mut [u8]) {
        raw[0..2].copy_from_slice(&self.mode.to_le_bytes());
        raw[2..4].copy_from_slice(&self.uid.to_le_bytes());
        raw[4..8].copy_from_slice(&self.size.to_le_bytes());
        raw[8..12].copy_from_slice(&self.atime.to_le_bytes());
        raw[12..16].copy_from_slice(&self.ctime.to_le_bytes());
        raw[16..20].copy_from_slice(&self.mtime.to_le_bytes());
        raw[20..24].copy_from_slice(&self.dtime.to_le_bytes());
        raw[24..26].copy_from_slice(&self.gid.to_le_bytes());
        raw[26..28].copy_from_slice(&self.links_count.to_le_bytes());
        raw[28..32].copy_from_slice(&self.blocks.to_le_bytes());
        for (i, v) in self.block.iter().enumerate() {
            raw[40 + i * 4..44 + i * 4].copy_from_slice(&v.to_le_bytes());
        }
    }

    pub fn new_file(mode: u16) -> Self {
        Self {
            mode: MODE_FILE | (mode & 0x0FFF),
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            ctime: 0,
            mtime: 0,
            dtime: 0,
            links_count: 0,
            blocks: 0,
            block: [0; 15],
        }
    }

    pub fn new_dir(mode: u16) -> Self {
        Self {
            mode: MODE_DIR | (mode & 0x0FFF),
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            ctime: 0,
            mtime: 0,
            dtime: 0,
            links_count: 0,
            blocks: 0,
            block: [0; 15],
        }
    }
}

fn inode_table_location<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &Superblock,
    buf: &mut [u8],
    inode: u32,
) -> Result<(u64, usize), Error<Dev::Error>> {
    let (group, local) = blockgroup::group_for_inode(sb, inode);
    let desc = blockgroup::read(dev, sb, buf, group)?;
    let inode_size = sb.inode_size() as u64;
    let byte_offset = desc.inode_table as u64 * sb.block_size() as u64 + local as u64 * inode_size;
    let block = byte_offset / sb.block_size() as u64;
    let offset = (byte_offset % sb.block_size() as u64) as usize;
    Ok((block, offset))
}

pub fn read_inode<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &Superblock,
    buf: &mut [u8],
    inode: u32,
) -> Result<Inode, Error<Dev::Error>> {
    let (block, offset) = inode_table_location(dev, sb, buf, inode)?;
    dev.read(block, 1, &mut buf[..sb.block_size() as usize])?;
    Ok(Inode::decode(&buf[offset..offset + 128]))
}

pub fn write_inode<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &Superblock,
    buf: &mut [u8],
    inode: u32,
    data: &Inode,
) -> Result<(), Error<Dev::Error>> {
    let (block, offset) = inode_table_location(dev, sb, buf, inode)?;
    dev.read(block, 1, &mut buf[..sb.block_size() as usize])?;
    data.encode(&mut buf[offset..offset + 128]);
    dev.write(block, 1, &buf[..sb.block_size() as usize])
}

/// Resolves logical block `logical_block` of `data`'s contents to a
/// physical block number, allocating along the way when `allocate` is
/// `Allocate::Yes` (writes past the current end); returns `None` for a
/// hole on a read.
pub fn get_block_offset<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    data: &mut Inode,
    logical_block: u32,
    allocate: Allocate,
) -> Result<Option<u32>, Error<Dev::Error>> {
    let block_size = sb.block_size();
    if allocate == Allocate::No {
        let direct: [u32; 12] = data.block[0..12].try_into().unwrap();
        return indirection::resolve(
            dev,
            block_size,
            buf,
            &direct,
            data.block[12],
            data.block[13],
            data.block[14],
            logical_block,
        );
    }

    let mut direct: [u32; 12] = data.block[0..12].try_into().unwrap();
    let mut single = data.block[12];
    let mut double = data.block[13];
    let mut triple = data.block[14];

    let preferred_group = blockgroup::group_for_inode(sb, sb.first_inode).0;
    let result = indirection::resolve_for_write(
        dev,
        block_size,
        buf,
        &mut direct,
        &mut single,
        &mut double,
        &mut triple,
        logical_block,
        allocate,
        |dev, buf| {
            let b = alloc::allocate_block(dev, sb, buf, preferred_group)?;
            data.blocks += block_size / 512;
            Ok(b)
        },
    )?;

    data.block[0..12].copy_from_slice(&direct);
    data.block[12] = single;
    data.block[13] = double;
    data.block[14] = triple;
    Ok(result)
}

/// Reads the block at `logical_block` into `out` (zero-filled for holes).
pub fn read_block<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    data: &mut Inode,
    logical_block: u32,
    out: &mut [u8],
) -> Result<(), Error<Dev::Error>> {
    let block_size = sb.block_size() as usize;
    match get_block_offset(dev, sb, buf, data, logical_block, Allocate::No)? {
        Some(physical) => dev.read(physical as u64, 1, &mut out[..block_size]),
        None => {
            for b in out[..block_size].iter_mut() {
                *b = 0;
            }
            Ok(())
        }
    }
}

pub fn write_block<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    data: &mut Inode,
    logical_block: u32,
    input: &[u8],
) -> Result<(), Error<Dev::Error>> {
    let block_size = sb.block_size() as usize;
    let physical = get_block_offset(dev, sb, buf, data, logical_block, Allocate::Yes)?.ok_or(Error::Fault)?;
    dev.write(physical as u64, 1, &input[..block_size])
}

/// Allocates a fresh inode of the requested kind, zeroing its block array.
pub fn allocate<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    is_dir: bool,
    mode: u16,
) -> Result<(u32, Inode), Error<Dev::Error>> {
    let number = alloc::allocate_inode(dev, sb, buf, is_dir)?;
    let data = if is_dir { Inode::new_dir(mode) } else { Inode::new_file(mode) };
    write_inode(dev, sb, buf, number, &data)?;
    Ok((number, data))
}

/// Frees every block reachable from `data` (direct, then single/double/
/// triple indirect chains, deallocating the indirect blocks themselves
/// too), then frees the inode slot.
pub fn deallocate<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    inode: u32,
    data: &Inode,
) -> Result<(), Error<Dev::Error>> {
    for &b in &data.block[0..12] {
        if b != 0 {
            alloc::free_block(dev, sb, buf, b)?;
        }
    }
    deallocate_block_recursive(dev, sb, buf, data.block[12], 0)?;
    deallocate_block_recursive(dev, sb, buf, data.block[13], 1)?;
    deallocate_block_recursive(dev, sb, buf, data.block[14], 2)?;

    alloc::free_inode(dev, sb, buf, inode, data.is_dir())
}

/// Recursively frees an indirect block tree `depth` levels deep (0 =
/// single indirect: `block` holds data-block pointers directly; 1 =
/// double; 2 = triple), then frees `block` itself.
fn deallocate_block_recursive<Dev: BlockDevice>(
    dev: &mut Dev,
    sb: &mut Superblock,
    buf: &mut [u8],
    block: u32,
    depth: u32,
) -> Result<(), Error<Dev::Error>> {
    if block == 0 {
        return Ok(());
    }

    if depth == 0 {
        let block_size = sb.block_size() as usize;
        let pointers_per_block = block_size / 4;
        let mut scratch = [0u8; 8192];
        dev.read(block as u64, 1, &mut scratch[..block_size])?;
        for i in 0..pointers_per_block {
            let p = u32::from_le_bytes(scratch[i * 4..i * 4 + 4].try_into().unwrap());
            if p != 0 {
                alloc::free_block(dev, sb, buf, p)?;
            }
        }
    } else {
        let block_size = sb.block_size() as usize;
        let pointers_per_block = block_size / 4;
        let mut scratch = [0u8; 8192];
        dev.read(block as u64, 1, &mut scratch[..block_size])?;
        for i in 0..pointers_per_block {
            let p = u32::from_le_bytes(scratch[i * 4..i * 4 + 4].try_into().unwrap());
            deallocate_block_recursive(dev, sb, buf, p, depth - 1)?;
        }
    }

    alloc::free_block(dev, sb, buf, block)
}
