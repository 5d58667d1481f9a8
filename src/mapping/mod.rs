//! Object class → recyclability mapping store.
//!
//! The store is the only shared mutable state in the service. Every insertion
//! goes through the same gate:
//!
//! - `MappingRequest`: a submitted (class, verdict) pair, unchecked.
//! - `ValidatedMapping`: produced only by `MappingRequest::validate`.
//! - `Mapping`: what `MappingStore::commit` reports after the write landed.
//!
//! Validation runs before the write lock is taken and a commit is a single map
//! insert, so readers never see a half-applied mapping.

mod defaults;
mod keywords;
mod verdict;

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::ValidationError;

pub use defaults::DEFAULT_MAPPINGS;
pub use verdict::Recyclability;

/// Normalize an object class name: trim, lowercase, collapse inner whitespace.
pub fn normalize_class(class: &str) -> String {
    class
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// An effective mapping as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Mapping {
    pub object_class: String,
    pub recyclability: Recyclability,
}

/// A submitted mapping that has not been validated yet.
#[derive(Clone, Debug)]
pub struct MappingRequest {
    object_class: String,
    recyclability: String,
}

impl MappingRequest {
    pub fn new(object_class: impl Into<String>, recyclability: impl Into<String>) -> Self {
        Self {
            object_class: object_class.into(),
            recyclability: recyclability.into(),
        }
    }

    /// Check the class and verdict. A rejected request never reaches the store.
    pub fn validate(self) -> Result<ValidatedMapping, ValidationError> {
        let object_class = normalize_class(&self.object_class);
        if object_class.is_empty() {
            return Err(ValidationError {
                code: "EMPTY_OBJECT_CLASS",
                message: "object_class must contain at least one non-whitespace character"
                    .to_string(),
            });
        }
        let recyclability = self.recyclability.parse::<Recyclability>()?;
        Ok(ValidatedMapping {
            object_class,
            recyclability,
        })
    }
}

/// A mapping that passed validation. Fields are private so the only way to
/// obtain one is `MappingRequest::validate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedMapping {
    object_class: String,
    recyclability: Recyclability,
}

impl ValidatedMapping {
    pub fn object_class(&self) -> &str {
        &self.object_class
    }

    pub fn recyclability(&self) -> Recyclability {
        self.recyclability
    }
}

/// Thread-safe mapping store.
pub struct MappingStore {
    entries: RwLock<HashMap<String, Recyclability>>,
    keyword_fallback: bool,
}

impl MappingStore {
    /// Store seeded with `DEFAULT_MAPPINGS`.
    pub fn new() -> Self {
        Self::from_entries(DEFAULT_MAPPINGS.iter().copied())
    }

    /// Store with no mappings at all.
    pub fn empty() -> Self {
        Self::from_entries(std::iter::empty::<(&str, Recyclability)>())
    }

    /// Store seeded from already-typed entries. Class names are normalized;
    /// later duplicates overwrite earlier ones.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, Recyclability)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(class, verdict)| (normalize_class(class), verdict))
            .filter(|(class, _)| !class.is_empty())
            .collect();
        Self {
            entries: RwLock::new(entries),
            keyword_fallback: false,
        }
    }

    /// Enable keyword guessing for classes without a direct mapping.
    pub fn with_keyword_fallback(mut self, enabled: bool) -> Self {
        self.keyword_fallback = enabled;
        self
    }

    pub fn keyword_fallback(&self) -> bool {
        self.keyword_fallback
    }

    /// Direct mapping for a class, if any.
    pub fn get(&self, class: &str) -> Option<Recyclability> {
        self.read().get(&normalize_class(class)).copied()
    }

    /// Stored verdict for a class, `Unknown` when unmapped.
    pub fn lookup(&self, class: &str) -> Recyclability {
        self.get(class).unwrap_or(Recyclability::Unknown)
    }

    /// Verdict used by the classifier: direct mapping first, then keyword
    /// hints when enabled, then `Unknown`.
    pub fn resolve(&self, class: &str) -> Recyclability {
        let normalized = normalize_class(class);
        if let Some(verdict) = self.read().get(&normalized).copied() {
            return verdict;
        }
        if self.keyword_fallback {
            if let Some(verdict) = keywords::guess(&normalized) {
                return verdict;
            }
        }
        Recyclability::Unknown
    }

    /// The full closed set of verdicts, independent of what is mapped.
    pub fn categories(&self) -> Vec<Recyclability> {
        Recyclability::ALL.to_vec()
    }

    /// Validate and commit in one call.
    pub fn insert(&self, class: &str, verdict: &str) -> Result<Mapping, ValidationError> {
        let validated = MappingRequest::new(class, verdict).validate()?;
        Ok(self.commit(validated))
    }

    /// Insert or overwrite a validated mapping.
    pub fn commit(&self, mapping: ValidatedMapping) -> Mapping {
        let ValidatedMapping {
            object_class,
            recyclability,
        } = mapping;
        self.write().insert(object_class.clone(), recyclability);
        Mapping {
            object_class,
            recyclability,
        }
    }

    /// Mapped class names, sorted.
    pub fn supported_objects(&self) -> Vec<String> {
        let mut objects: Vec<String> = self.read().keys().cloned().collect();
        objects.sort();
        objects
    }

    /// Sorted copy of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, Recyclability> {
        self.read()
            .iter()
            .map(|(class, verdict)| (class.clone(), *verdict))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A writer only ever performs one `HashMap::insert`, so a poisoned lock
    // still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Recyclability>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Recyclability>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::new()
    }
}
