//! Representation of identifiers in a Sepal program.
use symbol_table::GlobalSymbol;

/// A unique, globally interned identifier. `Id`s are cheap to copy and
/// compare; the backing string lives in a process-wide symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    id: GlobalSymbol,
}

impl Id {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Id {
            id: GlobalSymbol::from(id.as_ref()),
        }
    }

    /// Resolve this identifier to its string in the global symbol table.
    pub fn as_str(&self) -> &'static str {
        self.id.as_str()
    }
}

/* =================== Impls for Id to make them easier to use ============== */

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}

impl From<&String> for Id {
    fn from(s: &String) -> Self {
        Id::new(s)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for Id {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other
    }
}

/// Things that have a name.
pub trait GetName {
    /// Return the name associated with this type.
    fn name(&self) -> Id;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_ids_compare_by_string() {
        let a = Id::from("x");
        let b = Id::new(String::from("x"));
        assert_eq!(a, b);
        assert_eq!(a, "x");
        assert_ne!(a, Id::from("y"));
    }

    #[test]
    fn display_roundtrips() {
        let id = Id::from("accel_A");
        assert_eq!(id.to_string(), "accel_A");
        assert_eq!(id.as_str(), "accel_A");
    }
}
