use std::{
    collections::HashMap,
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use tracing::error;

/// Callback invoked with the new value whenever a store detects a change.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Subscriber set of one store entry, keyed by caller-assigned id.
///
/// Subscribing again with an existing id replaces the previous callback.
pub struct Subscribers<T> {
    callbacks: HashMap<String, Callback<T>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self {
            callbacks: HashMap::new(),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.callbacks.keys()).finish()
    }
}

impl<T> Subscribers<T> {
    pub fn insert(&mut self, id: impl Into<String>, callback: Callback<T>) {
        self.callbacks.insert(id.into(), callback);
    }

    /// Returns true if `id` was subscribed.
    pub fn remove(&mut self, id: &str) -> bool {
        self.callbacks.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Copy of the callbacks, so they can be invoked after the lock guarding
    /// this set is released.
    pub fn callbacks(&self) -> Vec<(String, Callback<T>)> {
        self.callbacks
            .iter()
            .map(|(id, cb)| (id.clone(), cb.clone()))
            .collect()
    }
}

/// Invoke every callback with `value`. A panicking subscriber is logged and
/// does not keep the others from being notified.
pub fn notify_all<T>(callbacks: &[(String, Callback<T>)], value: &T) {
    for (id, callback) in callbacks {
        notify_one(id, callback, value);
    }
}

pub fn notify_one<T>(id: &str, callback: &Callback<T>, value: &T) {
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        error!(subscriber = %id, "Subscriber callback panicked");
    }
}
