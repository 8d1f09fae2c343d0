//! Owner-scoped lazy values.
//!
//! A host owns a handful of objects (its camera session, for one) that should
//! be built on first use and then live exactly as long as the host does, or
//! until the host tears its view down. [`ScopedLazy`] holds the construction
//! closure and the cached value together.

use std::cell::OnceCell;
use std::convert::Infallible;

/// A value built by an explicit closure on first access and cached until the
/// owner takes it back.
pub struct ScopedLazy<T, E = Infallible> {
    slot: OnceCell<T>,
    factory: Box<dyn Fn() -> Result<T, E>>,
}

impl<T> ScopedLazy<T> {
    /// Creates a lazy value from an infallible constructor.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            slot: OnceCell::new(),
            factory: Box::new(move || Ok(factory())),
        }
    }

    /// Returns the value, constructing it on first access.
    pub fn get(&self) -> &T {
        match self.try_get() {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }
}

impl<T, E> ScopedLazy<T, E> {
    /// Creates a lazy value from a fallible constructor. A failed
    /// construction caches nothing; the next access tries again.
    pub fn fallible<F>(factory: F) -> Self
    where
        F: Fn() -> Result<T, E> + 'static,
    {
        Self {
            slot: OnceCell::new(),
            factory: Box::new(factory),
        }
    }

    /// Returns the value, constructing it on first access.
    pub fn try_get(&self) -> Result<&T, E> {
        if let Some(value) = self.slot.get() {
            return Ok(value);
        }
        let value = (self.factory)()?;
        Ok(self.slot.get_or_init(|| value))
    }

    /// Returns the value only if it has already been constructed.
    pub fn get_if_initialized(&self) -> Option<&T> {
        self.slot.get()
    }

    /// Whether the value currently exists.
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }

    /// Hands the value back to the owner. The next access constructs a
    /// fresh one.
    pub fn take(&mut self) -> Option<T> {
        self.slot.take()
    }
}

impl<T: std::fmt::Debug, E> std::fmt::Debug for ScopedLazy<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedLazy")
            .field("value", &self.slot.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_constructs_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let lazy = ScopedLazy::new(move || {
            counter.set(counter.get() + 1);
            String::from("binding")
        });

        assert!(!lazy.is_initialized());
        assert_eq!(lazy.get(), "binding");
        assert_eq!(lazy.get(), "binding");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_take_then_rebuild() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let mut lazy = ScopedLazy::new(move || {
            counter.set(counter.get() + 1);
            counter.get()
        });

        assert_eq!(*lazy.get(), 1);
        assert_eq!(lazy.take(), Some(1));
        assert!(lazy.get_if_initialized().is_none());
        assert_eq!(*lazy.get(), 2);
    }

    #[test]
    fn test_failed_construction_not_cached() {
        let attempts = Rc::new(Cell::new(0));
        let counter = Rc::clone(&attempts);
        let lazy: ScopedLazy<u32, &'static str> = ScopedLazy::fallible(move || {
            counter.set(counter.get() + 1);
            if counter.get() == 1 {
                Err("not yet")
            } else {
                Ok(7)
            }
        });

        assert_eq!(lazy.try_get(), Err("not yet"));
        assert!(!lazy.is_initialized());
        assert_eq!(lazy.try_get(), Ok(&7));
        assert_eq!(attempts.get(), 2);
    }
}
