//! Non-blocking guard around the shared crypto resource.
//!
//! The AES accelerator is one physical block shared by the background loop
//! and the radio callback, which may preempt it at any point. Whoever finds
//! the resource busy gives up immediately: the operation is dropped and
//! counted as a collision, and the next packet or loop iteration tries again.
//! Nothing here ever waits on a lock from callback context.

use std::sync::{
    Mutex, TryLockError,
    atomic::{AtomicU32, Ordering},
};

/// Exclusive, drop-on-contention access to `T`.
///
/// # Invariants
///
/// - At most one closure passed to [`try_with`](Self::try_with) runs at a time
/// - A `try_with` that finds the resource busy never runs its closure and
///   increments [`collisions`](Self::collisions) exactly once
#[derive(Debug, Default)]
pub struct CryptoResource<T> {
    inner: Mutex<T>,
    collisions: AtomicU32,
}

impl<T> CryptoResource<T> {
    /// Guard `value`.
    pub fn new(value: T) -> Self {
        Self { inner: Mutex::new(value), collisions: AtomicU32::new(0) }
    }

    /// Run `f` with exclusive access, or return `None` at once if the
    /// resource is busy.
    ///
    /// Safe to call from interrupt-like contexts.
    pub fn try_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        match self.inner.try_lock() {
            Ok(mut guard) => Some(f(&mut guard)),
            Err(TryLockError::WouldBlock) => {
                self.collisions.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("crypto resource busy, operation dropped");
                None
            },
            // Operations run to completion or fail with a Result, so a
            // poisoned guard still holds consistent state.
            Err(TryLockError::Poisoned(poisoned)) => Some(f(&mut poisoned.into_inner())),
        }
    }

    /// Run `f` with shared access, waiting for any operation in flight.
    ///
    /// For diagnostics from the background loop only. Never call this from a
    /// packet callback.
    pub fn inspect<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    /// Exclusive access through `&mut self`; no contention is possible.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Number of operations dropped because the resource was busy.
    pub fn collisions(&self) -> u32 {
        self.collisions.load(Ordering::Relaxed)
    }

    /// Unwrap the guarded value.
    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Barrier},
        thread,
    };

    use super::*;

    #[test]
    fn uncontended_access_runs_closure() {
        let resource = CryptoResource::new(41u32);

        let result = resource.try_with(|value| {
            *value += 1;
            *value
        });

        assert_eq!(result, Some(42));
        assert_eq!(resource.collisions(), 0);
    }

    #[test]
    fn nested_access_is_a_collision() {
        let resource = CryptoResource::new(0u32);

        let outer = resource.try_with(|value| {
            *value += 1;
            resource.try_with(|value| *value)
        });

        assert_eq!(outer, Some(None));
        assert_eq!(resource.collisions(), 1);
        assert_eq!(resource.into_inner(), 1);
    }

    #[test]
    fn contended_access_lets_exactly_one_through() {
        let resource = Arc::new(CryptoResource::new(0u32));
        let holding = Arc::new(Barrier::new(2));
        let attempted = Arc::new(Barrier::new(2));

        let holder = {
            let resource = Arc::clone(&resource);
            let holding = Arc::clone(&holding);
            let attempted = Arc::clone(&attempted);
            thread::spawn(move || {
                resource.try_with(|value| {
                    holding.wait();
                    attempted.wait();
                    *value += 1;
                })
            })
        };

        holding.wait();
        let contender = resource.try_with(|value| *value += 1);
        attempted.wait();

        assert!(holder.join().unwrap().is_some());
        assert!(contender.is_none());
        assert_eq!(resource.collisions(), 1);
        assert_eq!(resource.inspect(|value| *value), 1);
    }

    #[test]
    fn poisoned_resource_stays_usable() {
        let resource = Arc::new(CryptoResource::new(5u32));

        let poisoner = Arc::clone(&resource);
        let _ = thread::spawn(move || {
            poisoner.try_with(|value| {
                *value += 1;
                if *value > 0 {
                    panic!("poison the guard");
                }
            });
        })
        .join();

        assert_eq!(resource.try_with(|value| *value), Some(6));
        assert_eq!(resource.collisions(), 0);
    }
}
