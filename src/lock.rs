//! The OS lock façade consumed by the mount table and by individual mounts
//! (spec.md §6 "Lock contract"), descended from `common/lock.h`'s
//! `common_lock_t { lock, unlock }` function-pointer pair.

/// An infallible, externally-provided lock. Implementors back this with
/// whatever the host has: a spinlock, a semaphore, a no-op for a
/// single-threaded test harness, ...
pub trait Lock {
    fn lock(&self);
    fn unlock(&self);

    /// Runs `f` with the lock held, unlocking on every exit path including
    /// panics that unwind through `f`. This generalizes the teacher's
    /// `MutexInterface::cs` closure convention to the host-provided,
    /// non-owning `Lock` façade.
    fn critical_section<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        self.lock();
        let guard = UnlockOnDrop(self);
        let result = f();
        drop(guard);
        result
    }
}

struct UnlockOnDrop<'a, L: Lock + ?Sized>(&'a L);

impl<'a, L: Lock + ?Sized> Drop for UnlockOnDrop<'a, L> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

/// A `Lock` that does nothing; used where no concurrency exists (a test
/// harness, a single-threaded bootloader stage).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLock;

impl Lock for NoLock {
    fn lock(&self) {}
    fn unlock(&self) {}
}

/// A simple test/bring-up `Lock` built on a spin-loop over an atomic flag.
/// Works under `no_std` (atomics are in `core`) unlike a `std::sync::Mutex`
/// adapter would, which is awkward here since spec.md's `lock`/`unlock`
/// pair is infallible and non-owning (no guard to stash a `MutexGuard` in).
pub struct SpinLock {
    locked: core::sync::atomic::AtomicBool,
}

impl Default for SpinLock {
    fn default() -> Self {
        Self { locked: core::sync::atomic::AtomicBool::new(false) }
    }
}

impl Lock for SpinLock {
    fn lock(&self) {
        use core::sync::atomic::Ordering;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.locked.store(false, core::sync::atomic::Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_eq as eq;
    use core::cell::Cell;

    struct CountingLock {
        locks: Cell<u32>,
        unlocks: Cell<u32>,
    }

    impl Lock for CountingLock {
        fn lock(&self) {
            self.locks.set(self.locks.get() + 1);
        }
        fn unlock(&self) {
            self.unlocks.set(self.unlocks.get() + 1);
        }
    }

    #[test]
    fn critical_section_always_unlocks() {
        let l = CountingLock { locks: Cell::new(0), unlocks: Cell::new(0) };

        l.critical_section(|| {});
        eq!(l.locks.get(), 1);
        eq!(l.unlocks.get(), 1);
    }

    #[test]
    fn critical_section_unlocks_on_panic() {
        let l = CountingLock { locks: Cell::new(0), unlocks: Cell::new(0) };

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            l.critical_section(|| panic!("boom"));
        }));

        assert!(result.is_err());
        eq!(l.unlocks.get(), 1);
    }
}
