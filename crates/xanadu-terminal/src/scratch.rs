//! Typed session scratch store.
//!
//! Values are keyed by [`StateKey<T>`]; the key's type parameter fixes the
//! stored type at compile time, so two call sites cannot disagree about
//! what lives under a name.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use xanadu_types::error::{Result, XanaduError};

/// A named, typed slot in the [`Scratch`] store.
pub struct StateKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StateKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Session-lifetime values shared between a context and all of its forks.
#[derive(Default)]
pub struct Scratch {
    values: HashMap<&'static str, Box<dyn Any>>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: 'static>(&self, key: &StateKey<T>) -> Option<&T> {
        self.values.get(key.name)?.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self, key: &StateKey<T>) -> Option<&mut T> {
        self.values.get_mut(key.name)?.downcast_mut()
    }

    /// Store `value`, returning the previous one if it had the same type.
    pub fn insert<T: 'static>(&mut self, key: &StateKey<T>, value: T) -> Option<T> {
        self.values
            .insert(key.name, Box::new(value))
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    pub fn remove<T: 'static>(&mut self, key: &StateKey<T>) -> Option<T> {
        self.values
            .remove(key.name)
            .and_then(|old| old.downcast().ok())
            .map(|old| *old)
    }

    /// Value under `key`, inserting `init()` first if absent or mistyped.
    pub fn get_or_insert_with<T: 'static>(
        &mut self,
        key: &StateKey<T>,
        init: impl FnOnce() -> T,
    ) -> Result<&mut T> {
        if self.values.get(key.name).is_some_and(|v| !v.is::<T>()) {
            log::warn!("scratch key {} held a different type; replacing", key.name);
            self.values.remove(key.name);
        }
        let slot = self
            .values
            .entry(key.name)
            .or_insert_with(|| Box::new(init()) as Box<dyn Any>);
        slot.downcast_mut().ok_or_else(|| {
            XanaduError::Command(format!("scratch key {} holds a different type", key.name))
        })
    }

    pub fn contains<T: 'static>(&self, key: &StateKey<T>) -> bool {
        self.get(key).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNT: StateKey<u32> = StateKey::new("test.count");
    const LABEL: StateKey<String> = StateKey::new("test.label");

    #[test]
    fn insert_and_get() {
        let mut scratch = Scratch::new();
        assert!(scratch.get(&COUNT).is_none());
        scratch.insert(&COUNT, 3);
        assert_eq!(scratch.get(&COUNT), Some(&3));
        assert_eq!(scratch.insert(&COUNT, 4), Some(3));
    }

    #[test]
    fn get_or_insert_with_mutates_in_place() {
        let mut scratch = Scratch::new();
        *scratch.get_or_insert_with(&COUNT, || 0).unwrap() += 2;
        *scratch.get_or_insert_with(&COUNT, || 0).unwrap() += 2;
        assert_eq!(scratch.get(&COUNT), Some(&4));
    }

    #[test]
    fn mismatched_type_reads_as_absent() {
        let mut scratch = Scratch::new();
        let clash: StateKey<String> = StateKey::new("test.count");
        scratch.insert(&COUNT, 1);
        assert!(scratch.get(&clash).is_none());
        assert_eq!(scratch.get_or_insert_with(&clash, String::new).unwrap().as_str(), "");
    }

    #[test]
    fn remove_returns_value() {
        let mut scratch = Scratch::new();
        scratch.insert(&LABEL, "x".to_string());
        assert_eq!(scratch.remove(&LABEL).as_deref(), Some("x"));
        assert!(!scratch.contains(&LABEL));
    }
}
