/*
 *  guard.rs
 *
 *  luaplug - Lua server plugins for Source engine hosts
 *  (c) 2026 luaplug contributors
 *
 *  Scope-bound release of a resource with an explicit defuse
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

/// Owns a value together with the action that releases it.
///
/// The release action runs exactly once when the guard goes out of scope,
/// on every exit path including early `?` returns and unwinding. Calling
/// [`ScopeGuard::defuse`] hands the value back and the action never runs.
///
/// ```
/// use luaplug::guard::ScopeGuard;
///
/// let released = std::cell::Cell::new(false);
/// {
///     let _guard = ScopeGuard::new(7, |_| released.set(true));
/// }
/// assert!(released.get());
/// ```
pub struct ScopeGuard<T, F>
where
    F: FnOnce(T),
{
    value: ManuallyDrop<T>,
    release: ManuallyDrop<F>,
}

impl<T, F> ScopeGuard<T, F>
where
    F: FnOnce(T),
{
    pub fn new(value: T, release: F) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            release: ManuallyDrop::new(release),
        }
    }

    /// Disarms the guard and returns the value without releasing it.
    pub fn defuse(guard: Self) -> T {
        let mut guard = ManuallyDrop::new(guard);
        // SAFETY: the guard is never dropped, so each field is taken once.
        unsafe {
            ManuallyDrop::drop(&mut guard.release);
            ManuallyDrop::take(&mut guard.value)
        }
    }
}

impl<T, F> Deref for ScopeGuard<T, F>
where
    F: FnOnce(T),
{
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T, F> DerefMut for ScopeGuard<T, F>
where
    F: FnOnce(T),
{
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T, F> Drop for ScopeGuard<T, F>
where
    F: FnOnce(T),
{
    fn drop(&mut self) {
        // SAFETY: drop runs at most once and defuse forgets the guard.
        let (value, release) = unsafe {
            (
                ManuallyDrop::take(&mut self.value),
                ManuallyDrop::take(&mut self.release),
            )
        };
        release(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_release_runs_once_on_scope_exit() {
        let calls = Cell::new(0);
        {
            let _guard = ScopeGuard::new("state", |_| calls.set(calls.get() + 1));
            assert_eq!(calls.get(), 0);
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_release_receives_the_value() {
        let seen = RefCell::new(Vec::new());
        {
            let mut guard = ScopeGuard::new(vec![1, 2], |v| seen.borrow_mut().extend(v));
            guard.push(3);
        }
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn test_defuse_skips_release() {
        let calls = Cell::new(0);
        let guard = ScopeGuard::new(String::from("kept"), |_| calls.set(calls.get() + 1));
        let value = ScopeGuard::defuse(guard);
        assert_eq!(value, "kept");
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_release_runs_on_early_return() {
        fn fallible(calls: &Cell<u32>, fail: bool) -> Result<u32, ()> {
            let guard = ScopeGuard::new(5, |_| calls.set(calls.get() + 1));
            if fail {
                return Err(());
            }
            Ok(ScopeGuard::defuse(guard))
        }

        let calls = Cell::new(0);
        assert_eq!(fallible(&calls, true), Err(()));
        assert_eq!(calls.get(), 1);
        assert_eq!(fallible(&calls, false), Ok(5));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_release_runs_while_unwinding() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = ScopeGuard::new((), |_| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
