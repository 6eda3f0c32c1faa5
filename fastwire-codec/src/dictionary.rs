/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Operator state store.
//!
//! Copy, increment, delta, and tail operators compress against the last
//! value seen for a field. That state lives here, keyed by template id and
//! field name, so identical names in different templates never collide. The
//! store persists across messages and is cleared by `reset`.

use fastwire_core::Value;
use std::collections::HashMap;

/// State of one dictionary entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DictionaryState {
    /// Never seen; reads resolve to the operator's initial value.
    #[default]
    Undefined,
    /// Explicitly cleared by a null; reads as null.
    Empty,
    /// Holds the last logical value.
    Assigned(Value),
}

impl DictionaryState {
    /// Returns true if the entry was never seen.
    #[must_use]
    pub const fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Returns true if the entry was cleared by a null.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the assigned value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Assigned(v) => Some(v),
            _ => None,
        }
    }
}

const UNDEFINED: DictionaryState = DictionaryState::Undefined;

/// Previous-value dictionary for one codec instance.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: HashMap<u32, HashMap<String, DictionaryState>>,
}

impl Dictionary {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of an entry; unknown entries read as undefined.
    ///
    /// # Arguments
    /// * `template_id` - The owning template
    /// * `name` - The field name
    #[must_use]
    pub fn get(&self, template_id: u32, name: &str) -> &DictionaryState {
        self.entries
            .get(&template_id)
            .and_then(|dict| dict.get(name))
            .unwrap_or(&UNDEFINED)
    }

    /// Stores a value for an entry.
    pub fn assign(&mut self, template_id: u32, name: &str, value: Value) {
        self.entries
            .entry(template_id)
            .or_default()
            .insert(name.to_string(), DictionaryState::Assigned(value));
    }

    /// Marks an entry as explicitly cleared.
    pub fn set_empty(&mut self, template_id: u32, name: &str) {
        self.entries
            .entry(template_id)
            .or_default()
            .insert(name.to_string(), DictionaryState::Empty);
    }

    /// Reinitializes every entry to undefined.
    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
