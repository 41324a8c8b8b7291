//! File-open flag strings, ported from `common/file.c`'s
//! `common_file_parse_flags`.
//!
//! spec.md's file-open entry points take a `fopen`-style mode string rather
//! than a bitmask; this module is the one place that string is interpreted.

use crate::error::Error;

bitflags::bitflags! {
    /// The parsed form of an open-mode string. Mirrors `O_RDONLY` /
    /// `O_WRONLY` / `O_RDWR` / `O_CREAT` / `O_TRUNC` / `O_APPEND` from the
    /// original `common/file.h`.
    #[derive(Default)]
    pub struct OpenFlags: u32 {
        const READ   = 0b0000_0001;
        const WRITE  = 0b0000_0010;
        const CREATE = 0b0000_0100;
        const TRUNC  = 0b0000_1000;
        const APPEND = 0b0001_0000;
    }
}

impl OpenFlags {
    pub fn is_read(&self) -> bool {
        self.contains(OpenFlags::READ)
    }

    pub fn is_write(&self) -> bool {
        self.contains(OpenFlags::WRITE)
    }
}

/// Parses one of the nine accepted `fopen`-style mode strings into
/// [`OpenFlags`]. Any other string is `Error::InvalidArgument`, matching the
/// original's blanket `EINVAL` fallthrough.
pub fn parse<D: core::fmt::Debug>(flags: &str) -> Result<OpenFlags, Error<D>> {
    match flags {
        "r" | "rb" => Ok(OpenFlags::READ),
        "w" | "wb" => Ok(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNC),
        "a" | "ab" => Ok(OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND),
        "r+" | "rb+" | "r+b" => Ok(OpenFlags::READ | OpenFlags::WRITE),
        "w+" | "wb+" | "w+b" => Ok(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNC),
        "a+" | "ab+" | "a+b" => Ok(OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND),
        _ => Err(Error::InvalidArgument),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;

    fn p(s: &str) -> OpenFlags {
        parse::<core::convert::Infallible>(s).unwrap()
    }

    #[test]
    fn read_only_variants() {
        eq!(p("r"), OpenFlags::READ);
        eq!(p("rb"), OpenFlags::READ);
    }

    #[test]
    fn write_create_trunc_variants() {
        let expected = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNC;
        eq!(p("w"), expected);
        eq!(p("wb"), expected);
    }

    #[test]
    fn append_variants() {
        let expected = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND;
        eq!(p("a"), expected);
        eq!(p("ab"), expected);
    }

    #[test]
    fn read_write_variants() {
        let expected = OpenFlags::READ | OpenFlags::WRITE;
        eq!(p("r+"), expected);
        eq!(p("rb+"), expected);
        eq!(p("r+b"), expected);
    }

    #[test]
    fn read_write_create_trunc_variants() {
        let expected = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNC;
        eq!(p("w+"), expected);
        eq!(p("wb+"), expected);
        eq!(p("w+b"), expected);
    }

    #[test]
    fn read_write_append_variants() {
        let expected = OpenFlags::READ | OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::APPEND;
        eq!(p("a+"), expected);
        eq!(p("ab+"), expected);
        eq!(p("a+b"), expected);
    }

    #[test]
    fn rejects_unknown_strings() {
        for bad in ["", "rw", "x", "r++", "wa", "R"] {
            assert!(parse::<core::convert::Infallible>(bad).is_err(), "{bad:?} should be rejected");
        }
    }
}
