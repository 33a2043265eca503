//! Reference-counted wrappers used by the IR's ownership tree.
use std::cell::RefCell;
use std::rc::{Rc, Weak};

/// Alias for a RefCell contained in an Rc reference.
#[allow(clippy::upper_case_acronyms)]
pub type RRC<T> = Rc<RefCell<T>>;

/// Construct a new RRC.
pub fn rrc<T>(t: T) -> RRC<T> {
    Rc::new(RefCell::new(t))
}

/// A wrapper for a weak RefCell pointer.
/// Used by parent back-references in the internal representation; upgrading
/// panics because a parent outlives its children by construction.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug)]
pub struct WRC<T> {
    internal: Weak<RefCell<T>>,
}

impl<T> WRC<T> {
    /// Convenience method to upgrade and extract the underlying weak pointer.
    pub fn upgrade(&self) -> RRC<T> {
        self.internal
            .upgrade()
            .expect("weak reference points to a dropped value")
    }
}

/// From implementation with the same signature as `Rc::downgrade`.
impl<T> From<&RRC<T>> for WRC<T> {
    fn from(internal: &RRC<T>) -> Self {
        Self {
            internal: Rc::downgrade(internal),
        }
    }
}

/// Clone the Weak reference inside the WRC.
impl<T> Clone for WRC<T> {
    fn clone(&self) -> Self {
        Self {
            internal: Weak::clone(&self.internal),
        }
    }
}
