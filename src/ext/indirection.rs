//! Block-pointer indirection translator (spec.md §4.3 "Indirect block
//! translation"), grounded on `original_source/ext/indirection.c`'s API
//! shape (`ext_indirection_level`, walking single/double/triple indirect
//! blocks) but implemented against the *canonical* ext2 boundary formula
//! `12 + K + K^2 + K^3` (K = pointers per block), not the source's
//! non-canonical `K*(K+1)+12` — see SPEC_FULL.md Open Question 1.

use crate::device::BlockDevice;
use crate::error::Error;
use core::convert::TryInto;

pub const DIRECT_POINTERS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Direct,
    Single,
    Double,
    Triple,
}

/// Whether a newly-needed indirect block should be allocated on the fly
/// (writes past the current end) or a miss should simply report a hole
/// (reads, or `lseek`-style probing), mirroring the source's
/// `inode_allocate_t` distinction at each indirection hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allocate {
    No,
    Yes,
}

/// Classifies a 0-based logical block index and returns which indirection
/// level holds it, along with the path of indices to follow from the
/// inode's block array down to the final direct pointer slot.
pub fn locate(logical_block: u32, pointers_per_block: u32) -> (Level, [u32; 3]) {
    let k = pointers_per_block as u64;
    let lb = logical_block as u64;

    if lb < DIRECT_POINTERS as u64 {
        return (Level::Direct, [lb as u32, 0, 0]);
    }
    let lb = lb - DIRECT_POINTERS as u64;

    if lb < k {
        return (Level::Single, [lb as u32, 0, 0]);
    }
    let lb = lb - k;

    if lb < k * k {
        return (Level::Double, [(lb / k) as u32, (lb % k) as u32, 0]);
    }
    let lb = lb - k * k;

    let first = lb / (k * k);
    let rem = lb % (k * k);
    (Level::Triple, [first as u32, (rem / k) as u32, (rem % k) as u32])
}

/// Reads the logical-block-to-physical-block pointer for `logical_block`,
/// walking as many indirection hops as needed. Returns `Ok(None)` for an
/// unallocated (sparse) block.
pub fn resolve<Dev: BlockDevice>(
    dev: &mut Dev,
    block_size: u32,
    buf: &mut [u8],
    direct: &[u32; 12],
    single: u32,
    double: u32,
    triple: u32,
    logical_block: u32,
) -> Result<Option<u32>, Error<Dev::Error>> {
    let pointers_per_block = block_size / 4;
    let (level, path) = locate(logical_block, pointers_per_block);

    match level {
        Level::Direct => Ok(nonzero(direct[path[0] as usize])),
        Level::Single => read_pointer(dev, buf, single, path[0]),
        Level::Double => {
            match read_pointer(dev, buf, double, path[0])? {
                Some(l1) => read_pointer(dev, buf, l1, path[1]),
                None => Ok(None),
            }
        }
        Level::Triple => {
            match read_pointer(dev, buf, triple, path[0])? {
                Some(l1) => match read_pointer(dev, buf, l1, path[1])? {
                    Some(l2) => read_pointer(dev, buf, l2, path[2]),
                    None => Ok(None),
                },
                None => Ok(None),
            }
        }
    }
}

/// Like `resolve`, but allocates missing indirect blocks (zero-filling
/// them) and, if `allocate` is `Allocate::Yes`, the final data block too.
/// `direct` is passed by mutable reference so a freshly allocated direct
/// pointer can be written back into the inode's own block array; newly
/// allocated single/double/triple root pointers are returned so the
/// caller can persist them into the inode as well.
pub fn resolve_for_write<Dev: BlockDevice, A: FnMut(&mut Dev, &mut [u8]) -> Result<u32, Error<Dev::Error>>>(
    dev: &mut Dev,
    block_size: u32,
    buf: &mut [u8],
    direct: &mut [u32; 12],
    single: &mut u32,
    double: &mut u32,
    triple: &mut u32,
    logical_block: u32,
    allocate: Allocate,
    mut alloc_block: A,
) -> Result<Option<u32>, Error<Dev::Error>> {
    let pointers_per_block = block_size / 4;
    let (level, path) = locate(logical_block, pointers_per_block);

    match level {
        Level::Direct => {
            if direct[path[0] as usize] == 0 && allocate == Allocate::Yes {
                direct[path[0] as usize] = alloc_block(dev, buf)?;
            }
            Ok(nonzero(direct[path[0] as usize]))
        }
        Level::Single => {
            ensure_root(dev, buf, block_size, single, allocate, &mut alloc_block)?;
            write_through(dev, buf, block_size, *single, path[0], allocate, &mut alloc_block)
        }
        Level::Double => {
            ensure_root(dev, buf, block_size, double, allocate, &mut alloc_block)?;
            let l1 = match write_through(dev, buf, block_size, *double, path[0], allocate, &mut alloc_block)? {
                Some(b) => b,
                None => return Ok(None),
            };
            write_through(dev, buf, block_size, l1, path[1], allocate, &mut alloc_block)
        }
        Level::Triple => {
            ensure_root(dev, buf, block_size, triple, allocate, &mut alloc_block)?;
            let l1 = match write_through(dev, buf, block_size, *triple, path[0], allocate, &mut alloc_block)? {
                Some(b) => b,
                None => return Ok(None),
            };
            let l2 = match write_through(dev, buf, block_size, l1, path[1], allocate, &mut alloc_block)? {
                Some(b) => b,
                None => return Ok(None),
            };
            write_through(dev, buf, block_size, l2, path[2], allocate, &mut alloc_block)
        }
    }
}

fn ensure_root<Dev: BlockDevice, A: FnMut(&mut Dev, &mut [u8]) -> Result<u32, Error<Dev::Error>>>(
    dev: &mut Dev,
    buf: &mut [u8],
    block_size: u32,
    root: &mut u32,
    allocate: Allocate,
    alloc_block: &mut A,
) -> Result<(), Error<Dev::Error>> {
    if *root != 0 || allocate != Allocate::Yes {
        return Ok(());
    }
    let new_block = alloc_block(dev, buf)?;
    zero_block(dev, buf, block_size, new_block)?;
    *root = new_block;
    Ok(())
}

/// Reads the pointer at `index` within indirect block `holder`; if it is
/// zero and `allocate` is `Yes`, allocates a fresh (zeroed) block, writes
/// the new pointer back into `holder`, and returns it.
fn write_through<Dev: BlockDevice, A: FnMut(&mut Dev, &mut [u8]) -> Result<u32, Error<Dev::Error>>>(
    dev: &mut Dev,
    buf: &mut [u8],
    block_size: u32,
    holder: u32,
    index: u32,
    allocate: Allocate,
    alloc_block: &mut A,
) -> Result<Option<u32>, Error<Dev::Error>> {
    dev.read(holder as u64, 1, &mut buf[..block_size as usize])?;
    let offset = index as usize * 4;
    let existing = nonzero(u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap()));

    match existing {
        Some(b) => Ok(Some(b)),
        None if allocate == Allocate::Yes => {
            let new_block = alloc_block(dev, buf)?;
            dev.read(holder as u64, 1, &mut buf[..block_size as usize])?;
            buf[offset..offset + 4].copy_from_slice(&new_block.to_le_bytes());
            dev.write(holder as u64, 1, &buf[..block_size as usize])?;
            zero_block(dev, buf, block_size, new_block)?;
            Ok(Some(new_block))
        }
        None => Ok(None),
    }
}

fn zero_block<Dev: BlockDevice>(
    dev: &mut Dev,
    buf: &mut [u8],
    block_size: u32,
    block: u32,
) -> Result<(), Error<Dev::Error>> {
    for b in buf[..block_size as usize].iter_mut() {
        *b = 0;
    }
    dev.write(block as u64, 1, &buf[..block_size as usize])
}

fn nonzero(v: u32) -> Option<u32> {
    if v == 0 {
        None
    } else {
        Some(v)
    }
}

fn read_pointer<Dev: BlockDevice>(
    dev: &mut Dev,
    buf: &mut [u8],
    block: u32,
    index: u32,
) -> Result<Option<u32>, Error<Dev::Error>> {
    if block == 0 {
        return Ok(None);
    }
    dev.read(block as u64, 1, buf)?;
    let offset = index as usize * 4;
    Ok(nonzero(u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;

    #[test]
    fn direct_range_boundary() {
        eq!(locate(0, 256).0, Level::Direct);
        eq!(locate(11, 256).0, Level::Direct);
        eq!(locate(12, 256).0, Level::Single);
    }

    #[test]
    fn single_to_double_boundary_is_canonical() {
        // 12 direct + 256 single = 268 before double starts.
        eq!(locate(12 + 256 - 1, 256).0, Level::Single);
        eq!(locate(12 + 256, 256).0, Level::Double);
    }

    #[test]
    fn double_to_triple_boundary_is_canonical() {
        // 12 + 256 + 256^2 = 65804 before triple starts.
        let boundary = 12 + 256 + 256 * 256;
        eq!(locate(boundary - 1, 256).0, Level::Double);
        eq!(locate(boundary, 256).0, Level::Triple);
    }

    #[test]
    fn double_indices_split_correctly() {
        let (level, path) = locate(12 + 256 + 256 + 3, 256);
        eq!(level, Level::Double);
        eq!(path[0], 1);
        eq!(path[1], 3);
    }
}
