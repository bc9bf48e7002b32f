//! Interned symbols for operator names, attribute keys and debug names.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use lasso::{Rodeo, Spur};
use parking_lot::RwLock;

/// Process-wide interner shared by every graph.
static NAMES: LazyLock<RwLock<Rodeo>> = LazyLock::new(Default::default);

/// An interned name.
///
/// Equality and hashing use the 4-byte key. Ordering compares the text, so
/// maps keyed by `Symbol` iterate the same way in every run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    pub fn new(text: &'static str) -> Self {
        Self::intern(text, |names| names.get_or_intern_static(text))
    }

    /// Like [`Symbol::new`], for text that is not `'static`.
    pub fn from_dynamic(text: &str) -> Self {
        Self::intern(text, |names| names.get_or_intern(text))
    }

    fn intern(text: &str, insert: impl FnOnce(&mut Rodeo) -> Spur) -> Self {
        let mut names = NAMES.upgradable_read();
        let key = names.get(text);
        Symbol(key.unwrap_or_else(|| names.with_upgraded(insert)))
    }

    /// Borrow the text. The interner stays read-locked for the duration of
    /// `f`; the lock is recursive so `f` may touch other symbols.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(NAMES.read_recursive().resolve(&self.0))
    }
}

impl From<&'static str> for Symbol {
    fn from(text: &'static str) -> Self {
        Symbol::new(text)
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.with_str(|text| text == *other)
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            Ordering::Equal
        } else {
            self.with_str(|a| other.with_str(|b| a.cmp(b)))
        }
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|text| f.write_str(text))
    }
}
