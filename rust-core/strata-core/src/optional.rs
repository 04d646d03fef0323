//! # Optional Values
//!
//! Presence-tracking wrapper used for every middleware-populated slot of a
//! [`crate::HandlerContext`]. A slot starts empty and is filled at most once
//! by the middleware that owns it.
//!
//! Only non-failing accessors are offered: callers either borrow the value
//! (`get`), fall back to a default (`get_or_default`, `get_or`) or convert
//! back into a plain `Option`.

/// A value that may or may not have been provided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Optional<T> {
    value: Option<T>,
}

impl<T> Optional<T> {
    /// Wrap a present value
    #[must_use]
    pub const fn of(value: T) -> Self {
        Self { value: Some(value) }
    }

    /// An absent value
    #[must_use]
    pub const fn empty() -> Self {
        Self { value: None }
    }

    /// Whether a value was provided
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// Borrow the value if present
    #[must_use]
    pub const fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Mutably borrow the value if present
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    /// The value, or `fallback` when absent
    pub fn get_or(&self, fallback: T) -> T
    where
        T: Clone,
    {
        self.value.clone().unwrap_or(fallback)
    }

    /// The value, or `T::default()` when absent
    pub fn get_or_default(&self) -> T
    where
        T: Clone + Default,
    {
        self.value.clone().unwrap_or_default()
    }

    /// Take the value out, leaving the slot empty
    pub fn take(&mut self) -> Option<T> {
        self.value.take()
    }

    /// Convert into a plain `Option`
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        self.value
    }
}

impl<T> Default for Optional<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<Option<T>> for Optional<T> {
    fn from(value: Option<T>) -> Self {
        Self { value }
    }
}

impl<T> From<Optional<T>> for Option<T> {
    fn from(value: Optional<T>) -> Self {
        value.value
    }
}
