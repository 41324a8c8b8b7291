//! The process-wide mount table (spec.md §4.1), descended from
//! `common/mountpoint.c`'s `common_mountpoint_*` family. The original keeps
//! mount records on an intrusive linked list (`thirdparty/queue.h`); since
//! this crate never allocates, mount records instead live in a fixed-size
//! array sized by a const generic, which plays the same "process-wide
//! table, added-to and removed-from under a lock" role.

pub mod path;

use crate::error::Error;
use crate::lock::Lock;
use path::{strip_mountpoint, MountPath, PathError};

/// One entry in the mount table: a mountpoint path, the opaque filesystem
/// instance it dispatches to, whether it is actually mounted, and an
/// optional per-mount lock (spec.md "Mount record").
struct Entry<F, L> {
    path: MountPath,
    fs: F,
    mounted: bool,
    lock: Option<L>,
}

/// A fixed-capacity, longest-prefix-matching table of mount records.
///
/// `N` bounds how many filesystems can be mounted at once; callers pick it
/// (a bootloader might use `MountTable<Fs, NoLock, 2>`, a hosted test
/// harness something larger). The table itself carries no lock: spec.md
/// §5 has the *caller* hold the process-wide lock around every table
/// operation, the same way `COMMON_MP_LOCK`/`COMMON_MP_UNLOCK` bracket the
/// original's table mutations at the call sites rather than inside them.
pub struct MountTable<F, L, const N: usize> {
    entries: [Option<Entry<F, L>>; N],
}

impl<F, L, const N: usize> Default for MountTable<F, L, N> {
    fn default() -> Self {
        Self { entries: core::array::from_fn(|_| None) }
    }
}

impl<F, L, const N: usize> MountTable<F, L, N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new mount. Fails with `AlreadyExists` if `path` is
    /// already present, and with `InvalidArgument` if `path` is malformed
    /// (doesn't start/end with `/`, or exceeds `PATH_MAX`).
    pub fn add<D: core::fmt::Debug>(
        &mut self,
        path: &str,
        fs: F,
        mounted: bool,
        lock: Option<L>,
    ) -> Result<(), Error<D>> {
        let mount_path = MountPath::new(path).map_err(|e| match e {
            PathError::TooLong | PathError::NotAbsoluteDirectory => Error::InvalidArgument,
        })?;

        if self.by_mountpoint(mount_path.as_str()).is_some() {
            return Err(Error::AlreadyExists);
        }

        let slot = self.entries.iter_mut().find(|e| e.is_none()).ok_or(Error::NoSpace)?;
        *slot = Some(Entry { path: mount_path, fs, mounted, lock });
        Ok(())
    }

    /// Removes the mount at `path`. Fails with `NoSuchDevice` if absent.
    pub fn remove<D: core::fmt::Debug>(&mut self, path: &str) -> Result<F, Error<D>> {
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.as_ref().map_or(false, |e| e.path.as_str() == path))
            .ok_or(Error::NoSuchDevice)?;
        let entry = slot.take().expect("checked Some above");
        Ok(entry.fs)
    }

    /// Exact match on the mountpoint path.
    pub fn by_mountpoint(&self, path: &str) -> Option<&F> {
        self.entries.iter().flatten().find(|e| e.path.as_str() == path).map(|e| &e.fs)
    }

    pub fn by_mountpoint_mut(&mut self, path: &str) -> Option<&mut F> {
        self.entries.iter_mut().flatten().find(|e| e.path.as_str() == path).map(|e| &mut e.fs)
    }

    /// Longest-prefix match: returns the mount record whose path is a
    /// prefix of `path` with no shorter competitor (spec.md §4.1).
    /// Mountpoints always end in `/`, so there is never an ambiguous tie
    /// between e.g. `/fat/` and `/fatfoo/`.
    fn find_entry(&self, path: &str) -> Option<&Entry<F, L>> {
        self.entries
            .iter()
            .flatten()
            .filter(|e| path.starts_with(e.path.as_str()))
            .max_by_key(|e| e.path.len())
    }

    fn find_entry_mut(&mut self, path: &str) -> Option<&mut Entry<F, L>> {
        self.entries
            .iter_mut()
            .flatten()
            .filter(|e| path.starts_with(e.path.as_str()))
            .max_by_key(|e| e.path.len())
    }

    /// Resolves `path` to its mount and the remaining in-filesystem path
    /// (spec.md §4.1 path resolution steps 1-2).
    pub fn find<'p, D: core::fmt::Debug>(
        &self,
        path: &'p str,
    ) -> Result<(&F, &'p str), Error<D>> {
        let entry = self.find_entry(path).ok_or(Error::NoSuchDevice)?;
        Ok((&entry.fs, strip_mountpoint(entry.path.as_str(), path)))
    }

    pub fn find_mut<'p, D: core::fmt::Debug>(
        &mut self,
        path: &'p str,
    ) -> Result<(&mut F, &'p str), Error<D>> {
        let entry = self.find_entry_mut(path).ok_or(Error::NoSuchDevice)?;
        let rest = strip_mountpoint(entry.path.as_str(), path);
        Ok((&mut entry.fs, rest))
    }

    /// Installs (or clears, with `None`) the lock for an existing mount.
    /// Recovered from `common_mountpoint_setup_lock`, dropped from
    /// spec.md's distilled operation list but present in the original and
    /// useful when a lock becomes available only after `mount` runs.
    pub fn set_lock<D: core::fmt::Debug>(
        &mut self,
        path: &str,
        lock: Option<L>,
    ) -> Result<(), Error<D>> {
        let entry = self
            .entries
            .iter_mut()
            .flatten()
            .find(|e| e.path.as_str() == path)
            .ok_or(Error::NoSuchDevice)?;
        entry.lock = lock;
        Ok(())
    }

    pub fn is_mounted(&self, path: &str) -> bool {
        self.entries.iter().flatten().any(|e| e.path.as_str() == path && e.mounted)
    }
}

impl<F, L: Lock, const N: usize> MountTable<F, L, N> {
    /// Runs `f` with the named mount's lock held, if it has one, otherwise
    /// runs `f` unguarded (spec.md §5: "Acquires the mount's lock (if
    /// present) before any device I/O").
    pub fn with_mount_lock<D: core::fmt::Debug, R>(
        &self,
        path: &str,
        f: impl FnOnce() -> R,
    ) -> Result<R, Error<D>> {
        let entry = self.find_entry(path).ok_or(Error::NoSuchDevice)?;
        match &entry.lock {
            Some(lock) => Ok(lock.critical_section(f)),
            None => Ok(f()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::NoLock;
    use assert_eq as eq;

    type Table = MountTable<&'static str, NoLock, 4>;
    type E = Error<core::convert::Infallible>;

    #[test]
    fn add_then_exact_lookup() {
        let mut t = Table::new();
        t.add::<core::convert::Infallible>("/fat12/", "fs-a", true, None).unwrap();
        eq!(t.by_mountpoint("/fat12/"), Some(&"fs-a"));
    }

    #[test]
    fn duplicate_add_fails_with_already_exists() {
        let mut t = Table::new();
        t.add::<core::convert::Infallible>("/fat12/", "fs-a", true, None).unwrap();
        let err = t.add::<core::convert::Infallible>("/fat12/", "fs-b", true, None).unwrap_err();
        eq!(err, E::AlreadyExists);
    }

    #[test]
    fn add_rejects_malformed_path() {
        let mut t = Table::new();
        let err = t.add::<core::convert::Infallible>("fat12", "fs-a", true, None).unwrap_err();
        eq!(err, E::InvalidArgument);
    }

    #[test]
    fn remove_missing_mount_fails_with_no_such_device() {
        let mut t = Table::new();
        let err = t.remove::<core::convert::Infallible>("/nope/").unwrap_err();
        eq!(err, E::NoSuchDevice);
    }

    #[test]
    fn remove_then_lookup_misses() {
        let mut t = Table::new();
        t.add::<core::convert::Infallible>("/fat12/", "fs-a", true, None).unwrap();
        t.remove::<core::convert::Infallible>("/fat12/").unwrap();
        eq!(t.by_mountpoint("/fat12/"), None);
    }

    #[test]
    fn find_resolves_longest_prefix_among_nested_mounts() {
        let mut t = Table::new();
        t.add::<core::convert::Infallible>("/", "root-fs", true, None).unwrap();
        t.add::<core::convert::Infallible>("/mnt/fat12/", "fat12-fs", true, None).unwrap();

        let (fs, rest) = t.find::<core::convert::Infallible>("/mnt/fat12/dir/file.txt").unwrap();
        eq!(*fs, "fat12-fs");
        eq!(rest, "dir/file.txt");

        let (fs, rest) = t.find::<core::convert::Infallible>("/mnt/other/file.txt").unwrap();
        eq!(*fs, "root-fs");
        eq!(rest, "mnt/other/file.txt");
    }

    #[test]
    fn find_on_unmounted_path_is_no_such_device() {
        let t = Table::new();
        let err = t.find::<core::convert::Infallible>("/nope/file.txt").unwrap_err();
        eq!(err, E::NoSuchDevice);
    }

    #[test]
    fn table_capacity_is_enforced() {
        let mut t = Table::new();
        t.add::<core::convert::Infallible>("/a/", "1", true, None).unwrap();
        t.add::<core::convert::Infallible>("/b/", "2", true, None).unwrap();
        t.add::<core::convert::Infallible>("/c/", "3", true, None).unwrap();
        t.add::<core::convert::Infallible>("/d/", "4", true, None).unwrap();
        let err = t.add::<core::convert::Infallible>("/e/", "5", true, None).unwrap_err();
        eq!(err, E::NoSpace);
    }
}
