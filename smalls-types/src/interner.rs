use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// A handle returned by [`StringInterner::intern`]. Compares and hashes by
/// pointer identity, not content -- two handles are equal iff they came
/// from the same `intern` call site (directly or via a cached lookup).
#[derive(Debug, Clone)]
pub struct InternedString(Arc<str>);

impl InternedString {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for InternedString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl PartialEq for InternedString {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for InternedString {}

impl Hash for InternedString {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const () as usize).hash(state);
    }
}

impl std::fmt::Display for InternedString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonicalizes identifiers and qualified names into stable handles that
/// outlive any single compilation unit. Insertion is idempotent: interning
/// the same text twice, from any thread, returns handles that compare equal.
#[derive(Debug, Default)]
pub struct StringInterner {
    table: DashMap<Box<str>, Arc<str>>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, text: &str) -> InternedString {
        if let Some(existing) = self.table.get(text) {
            return InternedString(existing.clone());
        }
        let arc: Arc<str> = Arc::from(text);
        self.table.insert(Box::from(text), arc.clone());
        InternedString(arc)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
