//! Handles that let unrelated parts of a program share a heap object and agree, without a
//! collector, on exactly when it is destroyed.
//!
//! - [`Shared`] is a nullable strong handle, [`SharedRef`] a strong handle that always points at
//!   an object, [`Weak`] an observer that never keeps the object alive.
//! - [`Exclusive`] is a single owner and involves no counter.
//!
//! Every counted handle of one ownership group points at the same separately allocated
//! [`ReferenceCounter`]. The object is destroyed when the strong count drops from one to zero; the
//! counter record outlives it until the weak count is gone too, so weak handles can still observe
//! that the object died.
//!
//! Thread safety is part of the handle type: `Shared<T>` is `Shared<T, SingleThreaded>` with plain
//! counts, `Shared<T, ThreadSafe>` counts with [`atomic::Atomic`] and may cross threads. Cyclic
//! strong references leak, as with any reference counting.
//!
//! ```
//! use shared_ownership::{ReferenceCounted, Shared, Weak};
//!
//! let a: Shared<String> = Shared::new(String::from("hello"));
//! let w: Weak<String> = a.to_weak();
//! let b = w.lock();
//! assert_eq!(Shared::strong_count(&a), 2);
//!
//! drop(a);
//! drop(b);
//! assert!(!w.lock().is_valid());
//! ```
#![no_std]
#![allow(unused_unsafe)]
extern crate maybe_std as base;

#[cfg(any(test, feature = "std"))]
extern crate std;

/// A handle that shares a [`ReferenceCounter`] with other handles and exposes its counts.
pub trait ReferenceCounted {
    /// Get the number of strong handles in the ownership group, `0` for an empty handle.
    fn strong_count(this: &Self) -> usize;

    /// Get the number of weak handles in the ownership group, `0` for an empty handle.
    fn weak_count(this: &Self) -> usize;
}

pub mod atomic;
mod counter;
mod exclusive;
mod fatal;
mod link;
mod shared;
mod shared_ref;
mod upcast;
mod weak;

pub use crate::counter::{
    Count, ReferenceCounter, SingleThreaded, ThreadSafe, ThreadSafety, MAX_REFCOUNT,
};
pub use crate::exclusive::Exclusive;
pub use crate::fatal::{set_fatal_error_hook, take_fatal_error_hook, FatalErrorHook};
pub use crate::shared::Shared;
pub use crate::shared_ref::SharedRef;
pub use crate::upcast::Upcast;
pub use crate::weak::Weak;
