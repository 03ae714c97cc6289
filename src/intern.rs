use std::sync::RwLock;

use hashbrown::HashMap;
use once_cell::sync::Lazy;

/// Process-wide string table backing [`InternedSymbol`]. Strings are leaked
/// on insertion so symbols can hand out `&'static str` without holding the
/// lock.
#[derive(Debug, Default)]
struct InterningTable {
    strings: Vec<&'static str>,
    indices: HashMap<&'static str, u32>,
}

static INTERNING_TABLE: Lazy<RwLock<InterningTable>> = Lazy::new(Default::default);

/// An index into the string interning table. Used for variable, struct field
/// and function names.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InternedSymbol(u32);

impl InternedSymbol {
    pub fn new(value: &str) -> Self {
        if let Some(&index) = INTERNING_TABLE
            .read()
            .expect("interning table lock poisoned")
            .indices
            .get(value)
        {
            return Self(index);
        }

        let mut table = INTERNING_TABLE
            .write()
            .expect("interning table lock poisoned");

        // Someone may have inserted it between dropping the read lock and
        // taking the write lock
        if let Some(&index) = table.indices.get(value) {
            return Self(index);
        }

        let leaked: &'static str = Box::leak(value.to_owned().into_boxed_str());
        let index = table.strings.len() as u32;
        table.strings.push(leaked);
        table.indices.insert(leaked, index);

        Self(index)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn value(&self) -> &'static str {
        INTERNING_TABLE
            .read()
            .expect("interning table lock poisoned")
            .strings
            .get(self.0 as usize)
            .copied()
            .expect("Once an interned symbol is created, the string it references should never be removed from the table")
    }
}

impl From<&str> for InternedSymbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Debug for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternedSymbol")
            .field(&self.0)
            .field(&self.value())
            .finish()
    }
}

impl core::fmt::Display for InternedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.value())
    }
}
