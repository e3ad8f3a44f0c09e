//! Named variables shared between rules.
//!
//! The stash is a two-tier map. The *transient* tier is what `~name` writes;
//! it is cleared at every read boundary. The *persistent* tier (written via
//! `prestash`) survives reads until explicitly forgotten. Reads see the
//! transient tier overlaid on the persistent one, so a rule can shadow a
//! prestashed default for the duration of one read without losing it.

use std::collections::HashMap;

use crate::expr::Value;

/// Two-tier map of named variables.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stash {
    persistent: HashMap<String, Value>,
    transient: HashMap<String, Value>,
}

impl Stash {
    /// Unified read: transient shadows persistent.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.transient.get(name).or_else(|| self.persistent.get(name))
    }

    /// `~name = ...` writes the transient tier.
    pub fn set(&mut self, name: &str, value: Value) {
        self.transient.insert(name.to_string(), value);
    }

    /// `prestash` writes the persistent tier.
    pub fn prestash(&mut self, name: &str, value: Value) {
        self.persistent.insert(name.to_string(), value);
    }

    /// Read the persistent tier only.
    pub fn prestash_get(&self, name: &str) -> Option<&Value> {
        self.persistent.get(name)
    }

    /// `delete ~name`: the transient entry goes, a persistent copy stays.
    pub fn delete_transient(&mut self, name: &str) {
        self.transient.remove(name);
    }

    /// `forget`: erase the name from both tiers.
    pub fn forget(&mut self, name: &str) {
        self.transient.remove(name);
        self.persistent.remove(name);
    }

    pub fn has(&self, name: &str) -> bool {
        self.transient.contains_key(name) || self.persistent.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.transient.is_empty() && self.persistent.is_empty()
    }

    /// Read-boundary reset: only the transient tier is dropped.
    pub fn clear_transient(&mut self) {
        self.transient.clear();
    }
}
