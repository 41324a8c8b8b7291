//! Home of `BitMap`, a thin bit-level view over a borrowed byte buffer.
//!
//! ext block/inode bitmaps and the FAT free-cluster scan both boil down to
//! "find the first clear bit in a buffer, set it, keep a running free count"
//! over a buffer whose length is a runtime property of the mounted volume
//! (`blocks_per_group`, `inodes_per_group`, ...), not a compile-time one.
//! This is a generalization of the teacher's `BitMap<LEN: BitMapLen>` (which
//! used `typenum`/`generic_array` to fix the length at compile time) to a
//! runtime length, since a single binary here mounts volumes of differing
//! group sizes.

use super::Bits;

// A bad version of BitVec, I guess.
#[derive(Debug, PartialEq, Eq)]
pub struct BitMap<'a> {
    arr: &'a mut [u8],

    // Helper variables to speed up some queries:
    length: usize,
    num_free_bits: usize,
    next_free: usize,
}

impl<'a> BitMap<'a> {
    /// Wraps `arr` as a bitmap of `length` bits. `arr` must contain at least
    /// `ceil(length / 8)` bytes; `num_free_bits` is computed from `arr`'s
    /// current contents (the buffer is assumed to already hold the on-disk
    /// bitmap image).
    pub fn from_bytes(arr: &'a mut [u8], length: usize) -> Result<Self, ()> {
        if arr.len() * 8 < length {
            return Err(());
        }

        let mut num_free_bits = 0;
        for bit in 0..length {
            let (idx, offset) = (bit / 8, bit % 8);
            if !arr[idx].b(offset as u32) {
                num_free_bits += 1;
            }
        }

        Ok(Self { arr, length, num_free_bits, next_free: 0 })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn empty_bits(&self) -> usize {
        self.num_free_bits
    }

    pub fn clear_all(&mut self) {
        for b in 0..self.length() {
            let _ = self.set(b, false).unwrap();
        }
    }

    // Returns `Ok` if in bounds and `Err` otherwise.
    fn in_bounds(&self, bit: usize) -> Result<(), ()> {
        if (0..self.length()).contains(&bit) {
            Ok(())
        } else {
            Err(())
        }
    }

    // Returns `Ok(idx, offset)` if in bounds and `Err` if not in bounds.
    fn bit_to_idx(&self, bit: usize) -> Result<(usize, usize), ()> {
        self.in_bounds(bit).map(|()| (bit / 8, bit % 8))
    }

    // Returns `Ok(bool)` if in bounds and `Err` otherwise.
    pub fn get(&self, bit: usize) -> Result<bool, ()> {
        self.bit_to_idx(bit).map(|(idx, offset)| self.arr[idx].b(offset as u32))
    }

    // Returns the previous value of the bit.
    //
    // Returns an `Err` if out of bounds.
    pub fn set(&mut self, bit: usize, val: bool) -> Result<bool, ()> {
        let (idx, offset) = self.bit_to_idx(bit)?;

        let prev: bool = self.arr[idx].b(offset as u32);
        self.arr[idx].set_bit(offset as u32, val);

        match (prev, val) {
            (false, true) => self.num_free_bits -= 1,
            (true, false) => {
                self.num_free_bits += 1;
                self.next_free = bit;
            }
            (true, true) | (false, false) => {}
        }

        Ok(prev)
    }

    // Returns `Err` if there are no empty bits available.
    pub fn next_empty_bit(&mut self) -> Result<usize, ()> {
        // The only way this get can fail is if the length is 0. If this
        // happens we should return Err since we really do not have any
        // empty bits (or _any_ bits) available. So, the `?` is appropriate
        // here.
        if self.get(self.next_free)? == false {
            return Ok(self.next_free);
        }

        // If that didn't work we need to do a sweep.
        if self.num_free_bits == 0 {
            return Err(());
        }

        for b in (self.next_free..self.length()).chain(0..self.next_free) {
            if self.get(b).unwrap() == false {
                self.next_free = b;
                return Ok(b);
            }
        }

        Err(())
    }

    /// Allocates (sets) the first free bit, returning its index.
    pub fn alloc(&mut self) -> Result<usize, ()> {
        let bit = self.next_empty_bit()?;
        self.set(bit, true).unwrap();
        Ok(bit)
    }
}
