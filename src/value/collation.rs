//! Named text collations, resolvable by name and extensible at the database
//! level (`BINARY`, `NOCASE`, `RTRIM`, plus user-registered functions).

use std::cmp::Ordering;
use std::sync::Arc;

/// A `CollationFn` compares two text values and returns the same tri-state
/// ordering as `Ord::cmp`.
pub type CollationFn = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

#[derive(Clone)]
pub enum Collation {
    Binary,
    NoCase,
    RTrim,
    Custom(&'static str, CollationFn),
}

impl std::fmt::Debug for Collation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Collation {
    pub fn name(&self) -> &str {
        match self {
            Collation::Binary => "BINARY",
            Collation::NoCase => "NOCASE",
            Collation::RTrim => "RTRIM",
            Collation::Custom(name, _) => name,
        }
    }

    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Binary => a.cmp(b),
            Collation::NoCase => a.to_ascii_uppercase().cmp(&b.to_ascii_uppercase()),
            Collation::RTrim => a.trim_end().cmp(b.trim_end()),
            Collation::Custom(_, f) => f(a, b),
        }
    }

    /// Resolve a collation by name, the way a schema's stored collation name
    /// is turned back into a comparator at bind time. Unknown names fall
    /// back to `BINARY` consulting the registry first.
    pub fn resolve(name: &str, registry: &CollationRegistry) -> Collation {
        match name.to_ascii_uppercase().as_str() {
            "BINARY" => Collation::Binary,
            "NOCASE" => Collation::NoCase,
            "RTRIM" => Collation::RTrim,
            other => registry.lookup(other).unwrap_or(Collation::Binary),
        }
    }
}

/// Database-level registry of user-defined collations, consulted by
/// `Collation::resolve` for names beyond the three builtins.
#[derive(Default, Clone)]
pub struct CollationRegistry {
    custom: std::collections::HashMap<String, CollationFn>,
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &'static str, f: CollationFn) {
        self.custom.insert(name.to_ascii_uppercase(), f);
    }

    fn lookup(&self, name: &str) -> Option<Collation> {
        self.custom
            .get(name)
            .cloned()
            .map(|f| Collation::Custom(leak_name(name), f))
    }
}

fn leak_name(name: &str) -> &'static str {
    Box::leak(name.to_string().into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nocase_ignores_case() {
        assert_eq!(Collation::NoCase.compare("Abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn rtrim_ignores_trailing_space() {
        assert_eq!(Collation::RTrim.compare("abc", "abc  "), Ordering::Equal);
    }
}
