//! The FAT directory codec: 8.3 short entries plus VFAT long-name chains
//! (spec.md §4.2 "Directory codec"), descended from the teacher's
//! `DirEntry`/`DirIter` but generalized off the FAT32-only cluster chain
//! onto the fixed root region FAT12/16 also need, and with LFN support the
//! teacher never implemented.

use super::table::{self, Cluster, FatGeometry};
use crate::device::BlockDevice;
use crate::error::Error;

use core::convert::TryInto;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        /// `READ_ONLY | HIDDEN | SYSTEM | VOLUME_ID`: marks an LFN fragment.
        const LONG_NAME = 0x0F;
    }
}

const SLOT_SIZE: u32 = 32;
const SLOT_END: u8 = 0x00;
const SLOT_DELETED: u8 = 0xE5;
const LFN_LAST_FLAG: u8 = 0x40;
const MAX_LFN_CHARS: usize = 255;

/// Where a directory's slots live: the fixed pre-data region (FAT12/16
/// root) or a regular cluster chain (every other directory, and the
/// FAT32 root).
#[derive(Debug, Clone, Copy)]
pub enum DirLocation {
    FixedRoot { start_sector: u64, sector_count: u32 },
    Cluster(Cluster),
}

/// A fully-decoded directory entry: the short (8.3) name always, and the
/// long name if a valid LFN chain preceded it.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub short_name: [u8; 11],
    pub attributes: Attributes,
    pub first_cluster: Cluster,
    pub file_size: u32,
    pub long_name: Option<LongName>,
    /// Where this entry's 8.3 slot lives, and how many LFN slots precede
    /// it, needed to rewrite/delete the whole run later.
    pub locator: EntryLocator,
}

#[derive(Debug, Clone, Copy)]
pub struct EntryLocator {
    pub short_entry_index: u32,
    pub lfn_count: u32,
}

/// A long file name, stored as bounded UCS-2 (no allocator is assumed
/// anywhere in this crate).
#[derive(Debug, Clone)]
pub struct LongName {
    buf: [u16; MAX_LFN_CHARS],
    len: usize,
}

impl LongName {
    pub fn chars(&self) -> impl Iterator<Item = char> + '_ {
        char::decode_utf16(self.buf[..self.len].iter().copied())
            .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
    }

    pub fn units(&self) -> &[u16] {
        &self.buf[..self.len]
    }
}

impl PartialEq<&str> for LongName {
    fn eq(&self, other: &&str) -> bool {
        self.chars().eq(other.chars())
    }
}

pub enum State {
    Exists,
    Deleted,
    End,
}

fn slot_state(slot: &[u8; 32]) -> State {
    match slot[0] {
        SLOT_END => State::End,
        SLOT_DELETED => State::Deleted,
        _ => State::Exists,
    }
}

fn is_lfn_slot(slot: &[u8; 32]) -> bool {
    slot[11] == Attributes::LONG_NAME.bits()
}

fn short_name_checksum(name11: &[u8; 11]) -> u8 {
    let mut sum: u8 = 0;
    for &b in name11 {
        sum = (sum & 1).wrapping_shl(7).wrapping_add(sum >> 1).wrapping_add(b);
    }
    sum
}

/// Reformats an on-disk `NAME    EXT` short name as `NAME.EXT` (no
/// extension: bare `NAME`) and compares it case-insensitively to `name`.
fn short_name_matches(short: &[u8; 11], name: &str) -> bool {
    let mut formatted = [0u8; 12];
    let mut len = 0;
    for &b in &short[..8] {
        if b == b' ' {
            break;
        }
        formatted[len] = b;
        len += 1;
    }
    if short[8] != b' ' {
        formatted[len] = b'.';
        len += 1;
        for &b in &short[8..11] {
            if b == b' ' {
                break;
            }
            formatted[len] = b;
            len += 1;
        }
    }
    core::str::from_utf8(&formatted[..len]).map(|s| s.eq_ignore_ascii_case(name)).unwrap_or(false)
}

fn decode_short_entry(slot: &[u8; 32]) -> ([u8; 11], Attributes, Cluster, u32) {
    macro_rules! e {
        ($ty:tt, $offset:literal) => {
            $ty::from_le_bytes(slot[$offset..$offset + core::mem::size_of::<$ty>()].try_into().unwrap())
        };
    }

    let name: [u8; 11] = slot[0..11].try_into().unwrap();
    let attributes = Attributes::from_bits_truncate(slot[11]);
    let cluster_hi: u16 = e!(u16, 20);
    let cluster_lo: u16 = e!(u16, 26);
    let cluster = ((cluster_hi as u32) << 16) | cluster_lo as u32;
    let size: u32 = e!(u32, 28);

    (name, attributes, cluster, size)
}

fn encode_short_entry(name: &[u8; 11], attributes: Attributes, cluster: Cluster, size: u32) -> [u8; 32] {
    let mut slot = [0u8; 32];
    slot[0..11].copy_from_slice(name);
    slot[11] = attributes.bits();
    slot[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    slot[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    slot[28..32].copy_from_slice(&size.to_le_bytes());
    slot
}

fn decode_lfn_slot(slot: &[u8; 32]) -> (u8, u8, [u16; 13]) {
    let ordinal = slot[0];
    let checksum = slot[13];
    let mut units = [0u16; 13];

    let ranges: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];
    let mut idx = 0;
    for (start, count) in ranges {
        for i in 0..count {
            let off = start + i * 2;
            units[idx] = u16::from_le_bytes([slot[off], slot[off + 1]]);
            idx += 1;
        }
    }
    (ordinal, checksum, units)
}

fn encode_lfn_slot(ordinal: u8, checksum: u8, units: &[u16; 13]) -> [u8; 32] {
    let mut slot = [0u8; 32];
    slot[0] = ordinal;
    slot[11] = Attributes::LONG_NAME.bits();
    slot[13] = checksum;
    slot[26..28].copy_from_slice(&0u16.to_le_bytes());

    let ranges: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];
    let mut idx = 0;
    for (start, count) in ranges {
        for i in 0..count {
            let off = start + i * 2;
            slot[off..off + 2].copy_from_slice(&units[idx].to_le_bytes());
            idx += 1;
        }
    }
    slot
}

/// A live cursor into one directory's slots, backed by the device and a
/// caller-owned sector buffer (no internal caching, matching spec.md's
/// "caching beyond a single device buffer" non-goal).
pub struct Directory {
    pub location: DirLocation,
}

impl Directory {
    pub fn root(geo: &FatGeometry, bpb: &super::boot_sector::BiosParameterBlock) -> Self {
        if bpb.root_entry_count != 0 {
            Self {
                location: DirLocation::FixedRoot {
                    start_sector: bpb.first_root_dir_sector() as u64,
                    sector_count: bpb.root_dir_sectors(),
                },
            }
        } else {
            Self { location: DirLocation::Cluster(bpb.root_cluster) }
        }
    }

    pub fn at_cluster(cluster: Cluster) -> Self {
        Self { location: DirLocation::Cluster(cluster) }
    }

    fn slot_sector<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        index: u32,
    ) -> Result<Option<(u64, u32)>, Error<Dev::Error>> {
        let sector_size = geo.bytes_per_sector as u32;
        let byte_offset = index * SLOT_SIZE;

        match self.location {
            DirLocation::FixedRoot { start_sector, sector_count } => {
                let sector = start_sector + (byte_offset / sector_size) as u64;
                if sector >= start_sector + sector_count as u64 {
                    return Ok(None);
                }
                Ok(Some((sector, byte_offset % sector_size)))
            }
            DirLocation::Cluster(start_cluster) => {
                let cluster_bytes = geo.cluster_bytes();
                let cluster_index = byte_offset / cluster_bytes;
                let offset_in_cluster = byte_offset % cluster_bytes;

                let cluster = match table::get_by_num(dev, geo, buf, start_cluster, cluster_index)? {
                    Some(c) => c,
                    None => return Ok(None),
                };
                let sector = geo.cluster_to_lba(cluster) + (offset_in_cluster / sector_size) as u64;
                Ok(Some((sector, offset_in_cluster % sector_size)))
            }
        }
    }

    fn read_slot<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        index: u32,
    ) -> Result<Option<[u8; 32]>, Error<Dev::Error>> {
        let (sector, offset) = match self.slot_sector(dev, geo, buf, index)? {
            Some(v) => v,
            None => return Ok(None),
        };
        dev.read(sector, 1, buf)?;
        Ok(Some(buf[offset as usize..offset as usize + 32].try_into().unwrap()))
    }

    fn write_slot<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        index: u32,
        slot: &[u8; 32],
    ) -> Result<(), Error<Dev::Error>> {
        let (sector, offset) = self
            .slot_sector(dev, geo, buf, index)?
            .ok_or(Error::NoSpace)?;
        dev.read(sector, 1, buf)?;
        buf[offset as usize..offset as usize + 32].copy_from_slice(slot);
        dev.write(sector, 1, buf)?;
        Ok(())
    }

    /// Reads the next logical entry (absorbing any LFN run that precedes
    /// it) starting at slot `from`. Returns `(entry, next_index)`.
    pub fn next_entry<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        from: u32,
    ) -> Result<Option<(DirEntry, u32)>, Error<Dev::Error>> {
        let mut index = from;
        let mut lfn_units: [u16; MAX_LFN_CHARS] = [0; MAX_LFN_CHARS];
        let mut lfn_len = 0usize;
        let mut lfn_count = 0u32;
        let mut expected_checksum: Option<u8> = None;

        loop {
            let slot = match self.read_slot(dev, geo, buf, index)? {
                Some(s) => s,
                None => return Ok(None),
            };

            match slot_state(&slot) {
                State::End => return Ok(None),
                State::Deleted => {
                    index += 1;
                    lfn_len = 0;
                    lfn_count = 0;
                    expected_checksum = None;
                    continue;
                }
                State::Exists if is_lfn_slot(&slot) => {
                    let (ordinal, checksum, units) = decode_lfn_slot(&slot);
                    let seq = (ordinal & !LFN_LAST_FLAG) as usize;
                    if seq == 0 || seq > 20 {
                        // malformed ordinal; treat as noise, skip it
                        index += 1;
                        continue;
                    }
                    let chunk_start = (seq - 1) * 13;
                    if chunk_start + 13 > MAX_LFN_CHARS {
                        index += 1;
                        continue;
                    }
                    lfn_units[chunk_start..chunk_start + 13].copy_from_slice(&units);
                    lfn_len = lfn_len.max(chunk_start + 13);
                    lfn_count += 1;
                    expected_checksum.get_or_insert(checksum);
                    index += 1;
                }
                State::Exists => {
                    let (name, attributes, cluster, size) = decode_short_entry(&slot);

                    let long_name = if lfn_count > 0 {
                        let ok = expected_checksum == Some(short_name_checksum(&name));
                        if ok {
                            // trim trailing NUL/0xFFFF padding from the final chunk
                            let mut len = lfn_len;
                            while len > 0 && matches!(lfn_units[len - 1], 0x0000 | 0xFFFF) {
                                len -= 1;
                            }
                            Some(LongName { buf: lfn_units, len })
                        } else {
                            None
                        }
                    } else {
                        None
                    };

                    let entry = DirEntry {
                        short_name: name,
                        attributes,
                        first_cluster: cluster,
                        file_size: size,
                        long_name,
                        locator: EntryLocator { short_entry_index: index, lfn_count },
                    };
                    return Ok(Some((entry, index + 1)));
                }
            }
        }
    }

    /// Looks up a single entry by name, matching the long name if an LFN
    /// chain preceded it, else the reconstructed 8.3 short name
    /// (case-insensitive either way). Used by the path resolver walking a
    /// directory component at a time.
    pub fn find_by_name<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        name: &str,
    ) -> Result<Option<DirEntry>, Error<Dev::Error>> {
        let mut index = 0u32;
        loop {
            match self.next_entry(dev, geo, buf, index)? {
                None => return Ok(None),
                Some((entry, next_index)) => {
                    let matches = match &entry.long_name {
                        Some(long) => *long == name,
                        None => false,
                    } || short_name_matches(&entry.short_name, name);
                    if matches {
                        return Ok(Some(entry));
                    }
                    index = next_index;
                }
            }
        }
    }

    /// Scans for a run of `lfn_count + 1` consecutive free (`End`/`Deleted`)
    /// slots, extending the directory by one cluster if none is found
    /// (spec.md "Free-slot allocation"). Fixed roots cannot grow and fail
    /// with `NoSpace`.
    pub fn allocate_run<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        needed: u32,
    ) -> Result<u32, Error<Dev::Error>> {
        let mut index = 0u32;
        let mut run_start = 0u32;
        let mut run_len = 0u32;

        loop {
            match self.read_slot(dev, geo, buf, index)? {
                None => {
                    // Ran off the end of the allocated region: grow.
                    match self.location {
                        DirLocation::FixedRoot { .. } => return Err(Error::NoSpace),
                        DirLocation::Cluster(start_cluster) => {
                            let last = self.last_cluster(dev, geo, buf, start_cluster)?;
                            let new = table::allocate_chain(dev, geo, buf, 1, Some(last))?;
                            self.zero_cluster(dev, geo, buf, new)?;
                            // the newly zeroed cluster's slots are all `End`;
                            // the run-so-far plus this cluster now certainly
                            // suffices.
                            continue;
                        }
                    }
                }
                Some(slot) => match slot_state(&slot) {
                    State::End | State::Deleted => {
                        if run_len == 0 {
                            run_start = index;
                        }
                        run_len += 1;
                        if run_len >= needed {
                            return Ok(run_start);
                        }
                    }
                    State::Exists => {
                        run_len = 0;
                    }
                },
            }
            index += 1;
        }
    }

    fn last_cluster<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        start: Cluster,
    ) -> Result<Cluster, Error<Dev::Error>> {
        let mut cur = start;
        while let Some(n) = table::next(dev, geo, buf, cur)? {
            cur = n;
        }
        Ok(cur)
    }

    fn zero_cluster<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        cluster: Cluster,
    ) -> Result<(), Error<Dev::Error>> {
        for b in buf.iter_mut() {
            *b = 0;
        }
        let lba = geo.cluster_to_lba(cluster);
        for s in 0..geo.sectors_per_cluster as u64 {
            dev.write(lba + s, 1, buf)?;
        }
        Ok(())
    }

    /// Writes a new entry named `name` with the given attributes/cluster,
    /// generating a unique 8.3 short name and an LFN chain (spec.md
    /// "Writing a new entry with name N"). `name_exists` is consulted
    /// while generating the short name to guarantee directory-local
    /// uniqueness.
    pub fn write_entry<Dev: BlockDevice>(
        &mut self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        name: &str,
        attributes: Attributes,
        cluster: Cluster,
        size: u32,
    ) -> Result<EntryLocator, Error<Dev::Error>> {
        let units = encode_ucs2(name);
        let lfn_count = ((units.len + 12) / 13).max(if units.len == 0 { 0 } else { 1 }) as u32;

        let short = generate_short_name(self, dev, geo, buf, name)?;
        let checksum = short_name_checksum(&short);

        let total_slots = lfn_count + 1;
        let start = self.allocate_run(dev, geo, buf, total_slots)?;

        // LFN slots precede the 8.3 entry, emitted highest-ordinal first.
        for seq in (1..=lfn_count).rev() {
            let chunk_start = (seq - 1) as usize * 13;
            let mut chunk = [0xFFFFu16; 13];
            let remaining = units.len.saturating_sub(chunk_start);
            let take = remaining.min(13);
            chunk[..take].copy_from_slice(&units.buf[chunk_start..chunk_start + take]);
            if take < 13 {
                chunk[take] = 0x0000;
            }

            let ordinal = if seq == lfn_count { seq as u8 | LFN_LAST_FLAG } else { seq as u8 };
            let slot = encode_lfn_slot(ordinal, checksum, &chunk);
            self.write_slot(dev, geo, buf, start + (lfn_count - seq), &slot)?;
        }

        let short_index = start + lfn_count;
        let slot = encode_short_entry(&short, attributes, cluster, size);
        self.write_slot(dev, geo, buf, short_index, &slot)?;

        Ok(EntryLocator { short_entry_index: short_index, lfn_count })
    }

    /// Rewrites just the 8.3 slot's cluster/size fields, used on write-mode
    /// close (spec.md "Close semantics").
    pub fn update_entry<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        locator: EntryLocator,
        name: &[u8; 11],
        attributes: Attributes,
        cluster: Cluster,
        size: u32,
    ) -> Result<(), Error<Dev::Error>> {
        let slot = encode_short_entry(name, attributes, cluster, size);
        self.write_slot(dev, geo, buf, locator.short_entry_index, &slot)
    }

    /// Marks an entry (and its preceding LFN run) deleted.
    pub fn remove_entry<Dev: BlockDevice>(
        &self,
        dev: &mut Dev,
        geo: &FatGeometry,
        buf: &mut [u8],
        locator: EntryLocator,
    ) -> Result<(), Error<Dev::Error>> {
        for i in 0..=locator.lfn_count {
            let index = locator.short_entry_index - i;
            let mut slot = self.read_slot(dev, geo, buf, index)?.ok_or(Error::Fault)?;
            slot[0] = SLOT_DELETED;
            self.write_slot(dev, geo, buf, index, &slot)?;
        }
        Ok(())
    }
}

/// A long name staged as UCS-2 code units, before being chunked into LFN
/// slots. No allocator is assumed anywhere in this crate.
struct Ucs2Units {
    buf: [u16; MAX_LFN_CHARS],
    len: usize,
}

fn encode_ucs2(name: &str) -> Ucs2Units {
    let mut buf = [0u16; MAX_LFN_CHARS];
    let mut len = 0;
    for unit in name.encode_utf16() {
        if len >= MAX_LFN_CHARS {
            break;
        }
        buf[len] = unit;
        len += 1;
    }
    Ucs2Units { buf, len }
}

fn short_name_disallowed(c: u8) -> bool {
    matches!(c, b'.' | b' ' | 0x22 | 0x2A | 0x2B | 0x2C | 0x2F | 0x3A | 0x3B | 0x3C | 0x3D | 0x3E | 0x3F | 0x5B | 0x5C | 0x5D | 0x7C)
}

/// Generates an 11-byte short name for `name`, uppercased, with disallowed
/// characters stripped, truncated to `base~K` when necessary, where `K` is
/// the smallest integer making the name unique within `dir`.
fn generate_short_name<Dev: BlockDevice>(
    dir: &Directory,
    dev: &mut Dev,
    geo: &FatGeometry,
    buf: &mut [u8],
    name: &str,
) -> Result<[u8; 11], Error<Dev::Error>> {
    let (base_src, ext_src) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos + 1..]),
        _ => (name, ""),
    };

    let mut base = [b' '; 8];
    let mut base_len = 0;
    for c in base_src.bytes() {
        if base_len >= 8 {
            break;
        }
        let c = c.to_ascii_uppercase();
        if !short_name_disallowed(c) && c.is_ascii_graphic() {
            base[base_len] = c;
            base_len += 1;
        }
    }

    let mut ext = [b' '; 3];
    let mut ext_len = 0;
    for c in ext_src.bytes() {
        if ext_len >= 3 {
            break;
        }
        let c = c.to_ascii_uppercase();
        if !short_name_disallowed(c) && c.is_ascii_graphic() {
            ext[ext_len] = c;
            ext_len += 1;
        }
    }

    let needs_tail = base_len > 8 || name.bytes().any(|b| b.is_ascii_lowercase());
    if !needs_tail {
        let mut short = [b' '; 11];
        short[..8].copy_from_slice(&base);
        short[8..].copy_from_slice(&ext);
        if !name_collides(dir, dev, geo, buf, &short)? {
            return Ok(short);
        }
    }

    for k in 1u32..999_999 {
        let (digits, digit_len) = decimal_digits(k);
        let tail_len = 1 + digit_len; // '~' + digits
        let keep = 8usize.saturating_sub(tail_len).min(base_len);

        let mut short = [b' '; 11];
        short[..keep].copy_from_slice(&base[..keep]);
        short[keep] = b'~';
        short[keep + 1..keep + 1 + digit_len].copy_from_slice(&digits[..digit_len]);
        short[8..].copy_from_slice(&ext);

        if !name_collides(dir, dev, geo, buf, &short)? {
            return Ok(short);
        }
    }

    Err(Error::Fault)
}

/// Formats `n` as decimal digits into a fixed 6-byte buffer (enough for
/// any `K` the numeric-tail loop below tries), returning the used prefix
/// length.
fn decimal_digits(mut n: u32) -> ([u8; 6], usize) {
    let mut tmp = [0u8; 6];
    let mut i = 6;
    if n == 0 {
        i -= 1;
        tmp[i] = b'0';
    }
    while n > 0 {
        i -= 1;
        tmp[i] = b'0' + (n % 10) as u8;
        n /= 10;
    }
    let len = 6 - i;
    tmp.copy_within(i..6, 0);
    (tmp, len)
}

fn name_collides<Dev: BlockDevice>(
    dir: &Directory,
    dev: &mut Dev,
    geo: &FatGeometry,
    buf: &mut [u8],
    short: &[u8; 11],
) -> Result<bool, Error<Dev::Error>> {
    let mut index = 0u32;
    loop {
        match dir.next_entry(dev, geo, buf, index)? {
            None => return Ok(false),
            Some((entry, next_index)) => {
                if &entry.short_name == short {
                    return Ok(true);
                }
                index = next_index;
            }
        }
    }
}
