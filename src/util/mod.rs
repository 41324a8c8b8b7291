//! Small, dependency-free helpers shared by the FAT and ext engines.

pub mod bits;
pub mod bitmap;
pub mod trim;

pub use bits::Bits;
pub use bitmap::BitMap;
pub use trim::trim;
