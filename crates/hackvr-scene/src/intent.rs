//! Intent registry: server-declared semantic verbs a viewer may surface as
//! UI affordances.
//!
//! The registry starts with the predefined movement verbs. `create-intent`
//! is an upsert (relabeling an existing intent is fine); `destroy-intent`
//! removes, including the predefined entries.

use std::collections::HashMap;

use hackvr_protocol::{Ident, IntentId, Selector};

/// The predefined intents and their default labels.
pub const PREDEFINED: [(&str, &str); 7] = [
    ("$forward", "Forward"),
    ("$back", "Back"),
    ("$left", "Left"),
    ("$right", "Right"),
    ("$up", "Up"),
    ("$down", "Down"),
    ("$stop", "Stop"),
];

#[derive(Debug, Clone)]
pub struct IntentRegistry {
    map: HashMap<IntentId, String>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        let map = PREDEFINED
            .iter()
            .map(|(id, label)| (Ident::new(id).expect("predefined intent"), label.to_string()))
            .collect();
        Self { map }
    }

    pub fn label(&self, id: &IntentId) -> Option<&str> {
        self.map.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &IntentId) -> bool {
        self.map.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &IntentId> {
        self.map.keys()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Upsert an intent.
    pub fn upsert(&mut self, id: IntentId, label: String) {
        self.map.insert(id, label);
    }

    /// Remove every intent the selector matches, predefined ones included.
    /// Returns how many were removed.
    pub fn destroy(&mut self, selector: &Selector) -> usize {
        let doomed: Vec<IntentId> = self
            .map
            .keys()
            .filter(|id| selector.matches(id.as_str()))
            .cloned()
            .collect();
        for id in &doomed {
            self.map.remove(id);
        }
        doomed.len()
    }
}

impl Default for IntentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
