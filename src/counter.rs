//! The control block shared by every handle of one ownership group.

use base::cell::Cell;
use base::fmt;
use base::ptr::NonNull;

use base::prelude::v1::*;

use crate::atomic::{Atomic, MemoryOrder};
use crate::fatal::fatal_error;

/// A soft limit on either count.
///
/// Only leaking handles (`mem::forget` in a loop) gets a count this high. Going above it is a fatal
/// error, reported well before the count could wrap around to zero and free a live object.
pub const MAX_REFCOUNT: usize = isize::MAX as usize;

mod private {
    pub trait Sealed {}
}

/// Storage of a single count.
pub trait Count {
    fn new(value: usize) -> Self;

    fn load(&self) -> usize;

    /// Returns the previous value.
    fn fetch_add(&self, delta: usize) -> usize;

    /// Returns the previous value.
    fn fetch_sub(&self, delta: usize) -> usize;

    /// Stores `new` if the count is `current`, reporting whether it did.
    fn compare_exchange(&self, current: usize, new: usize) -> bool;

    /// Adds one unless the count is zero, as a single indivisible step. Returns the previous
    /// value, or `None` if the count was zero.
    fn increment_unless_zero(&self) -> Option<usize>;
}

impl Count for Cell<usize> {
    #[inline]
    fn new(value: usize) -> Self {
        Cell::new(value)
    }

    #[inline]
    fn load(&self) -> usize {
        self.get()
    }

    #[inline]
    fn fetch_add(&self, delta: usize) -> usize {
        let previous = self.get();
        self.set(previous.wrapping_add(delta));
        previous
    }

    #[inline]
    fn fetch_sub(&self, delta: usize) -> usize {
        let previous = self.get();
        self.set(previous.wrapping_sub(delta));
        previous
    }

    #[inline]
    fn compare_exchange(&self, current: usize, new: usize) -> bool {
        if self.get() == current {
            self.set(new);
            true
        } else {
            false
        }
    }

    #[inline]
    fn increment_unless_zero(&self) -> Option<usize> {
        match self.get() {
            0 => None,
            n => {
                self.set(n.wrapping_add(1));
                Some(n)
            }
        }
    }
}

impl Count for Atomic<usize> {
    #[inline]
    fn new(value: usize) -> Self {
        Atomic::new(value)
    }

    #[inline]
    fn load(&self) -> usize {
        Atomic::load(self, MemoryOrder::SequentiallyConsistent)
    }

    #[inline]
    fn fetch_add(&self, delta: usize) -> usize {
        Atomic::fetch_add(self, delta, MemoryOrder::SequentiallyConsistent)
    }

    #[inline]
    fn fetch_sub(&self, delta: usize) -> usize {
        Atomic::fetch_sub(self, delta, MemoryOrder::SequentiallyConsistent)
    }

    #[inline]
    fn compare_exchange(&self, current: usize, new: usize) -> bool {
        Atomic::compare_exchange(self, current, new, MemoryOrder::SequentiallyConsistent).is_ok()
    }

    fn increment_unless_zero(&self) -> Option<usize> {
        let mut n = Atomic::load(self, MemoryOrder::SequentiallyConsistent);
        loop {
            if n == 0 {
                return None;
            }

            let next = n.wrapping_add(1);
            match Atomic::compare_exchange(self, n, next, MemoryOrder::SequentiallyConsistent) {
                Ok(_) => return Some(n),
                Err(actual) => n = actual,
            }
        }
    }
}

/// Chooses how the counts of an ownership group are stored.
///
/// This is fixed per handle type, so a single-threaded group never pays for synchronization and
/// handles of the two flavours can never share a counter.
pub trait ThreadSafety: private::Sealed + 'static {
    type Count: Count;
}

/// Plain counts. Handles of this flavour are neither `Send` nor `Sync`.
#[derive(Debug)]
pub enum SingleThreaded {}

/// Atomic counts. Handles of this flavour are `Send` and `Sync` when the managed type is.
#[derive(Debug)]
pub enum ThreadSafe {}

impl private::Sealed for SingleThreaded {}
impl private::Sealed for ThreadSafe {}

impl ThreadSafety for SingleThreaded {
    type Count = Cell<usize>;
}

impl ThreadSafety for ThreadSafe {
    type Count = Atomic<usize>;
}

/// Strong and weak counts of one ownership group.
///
/// The record is a passive cell: the handles decide when the managed object and the record itself
/// are freed. While the strong count is above zero the stored weak count carries one extra share
/// on behalf of all strong handles, so that exactly one decrement observes the moment the record
/// becomes unreferenced. [`ReferenceCounter::weak_count`] reports weak handles only.
pub struct ReferenceCounter<M: ThreadSafety> {
    strong: M::Count,
    weak: M::Count,
}

impl<M: ThreadSafety> ReferenceCounter<M> {
    /// One strong owner, no weak observers.
    pub fn new() -> Self {
        Self::with_counts(1, 0)
    }

    /// No owners at all, used while an object is still under construction.
    pub fn zeroed() -> Self {
        Self::with_counts(0, 0)
    }

    pub fn with_counts(strong: usize, weak: usize) -> Self {
        ReferenceCounter {
            strong: <M::Count as Count>::new(strong),
            weak: <M::Count as Count>::new(weak + (strong > 0) as usize),
        }
    }

    pub fn strong_count(&self) -> usize {
        self.strong.load()
    }

    /// The number of weak handles.
    ///
    /// The two counts are read one after the other, so while the last strong handle is being
    /// dropped on another thread the result may be off by one. It is exact whenever no strong
    /// handle of the group is being dropped concurrently.
    pub fn weak_count(&self) -> usize {
        let strong = self.strong.load();
        let weak = self.weak.load();
        if strong > 0 {
            weak.saturating_sub(1)
        } else {
            weak
        }
    }

    /// Returns the previous strong count.
    pub(crate) fn increment_strong(&self) -> usize {
        checked(self.strong.fetch_add(1))
    }

    /// Returns the previous strong count.
    pub(crate) fn decrement_strong(&self) -> usize {
        self.strong.fetch_sub(1)
    }

    pub(crate) fn increment_strong_unless_zero(&self) -> bool {
        self.strong.increment_unless_zero().map(checked).is_some()
    }

    pub(crate) fn compare_exchange_strong(&self, current: usize, new: usize) -> bool {
        self.strong.compare_exchange(current, new)
    }

    /// Returns the previous stored weak count, including the strong group's share.
    pub(crate) fn increment_weak(&self) -> usize {
        checked(self.weak.fetch_add(1))
    }

    /// Returns the previous stored weak count, including the strong group's share.
    pub(crate) fn decrement_weak(&self) -> usize {
        self.weak.fetch_sub(1)
    }

    /// Moves the record to the heap, handing back the only pointer to it.
    pub(crate) fn allocate(self) -> NonNull<Self> {
        let counter = NonNull::from(Box::leak(Box::new(self)));
        log::trace!("allocated reference counter {:p}", counter);
        counter
    }

    /// # Safety
    ///
    /// `counter` must come from [`ReferenceCounter::allocate`] and no handle may still use it.
    pub(crate) unsafe fn free(counter: NonNull<Self>) {
        log::trace!("freeing reference counter {:p}", counter);
        drop(unsafe { Box::from_raw(counter.as_ptr()) });
    }
}

#[inline]
fn checked(previous: usize) -> usize {
    if previous > MAX_REFCOUNT {
        fatal_error("reference counter overflow");
    }
    previous
}

impl<M: ThreadSafety> Default for ReferenceCounter<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: ThreadSafety> fmt::Debug for ReferenceCounter<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceCounter")
            .field("strong", &self.strong_count())
            .field("weak", &self.weak_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_strong_owner() {
        let c = ReferenceCounter::<SingleThreaded>::new();
        assert_eq!(c.strong_count(), 1);
        assert_eq!(c.weak_count(), 0);
    }

    #[test]
    fn explicit_counts() {
        let c = ReferenceCounter::<ThreadSafe>::with_counts(3, 2);
        assert_eq!(c.strong_count(), 3);
        assert_eq!(c.weak_count(), 2);

        let z = ReferenceCounter::<ThreadSafe>::zeroed();
        assert_eq!(z.strong_count(), 0);
        assert_eq!(z.weak_count(), 0);
    }

    #[test]
    fn strong_group_holds_one_weak_share() {
        let c = ReferenceCounter::<SingleThreaded>::new();
        assert_eq!(c.increment_weak(), 1);
        assert_eq!(c.weak_count(), 1);

        assert_eq!(c.decrement_strong(), 1);
        assert_eq!(c.decrement_weak(), 2);
        assert_eq!(c.weak_count(), 1);
        assert_eq!(c.decrement_weak(), 1);
        assert_eq!(c.weak_count(), 0);
    }

    #[test]
    fn increment_unless_zero() {
        let c = ReferenceCounter::<ThreadSafe>::new();
        assert!(c.increment_strong_unless_zero());
        assert_eq!(c.strong_count(), 2);

        c.decrement_strong();
        c.decrement_strong();
        assert!(!c.increment_strong_unless_zero());
        assert_eq!(c.strong_count(), 0);

        let l = ReferenceCounter::<SingleThreaded>::zeroed();
        assert!(!l.increment_strong_unless_zero());
        l.increment_strong();
        assert!(l.increment_strong_unless_zero());
        assert_eq!(l.strong_count(), 2);
    }

    #[test]
    fn compare_exchange_strong() {
        let c = ReferenceCounter::<ThreadSafe>::with_counts(2, 0);
        assert!(!c.compare_exchange_strong(1, 0));
        c.decrement_strong();
        assert!(c.compare_exchange_strong(1, 0));
        assert_eq!(c.strong_count(), 0);
    }

    #[test]
    fn overflow_is_fatal() {
        let c = ReferenceCounter::<SingleThreaded>::with_counts(MAX_REFCOUNT, 0);
        assert_eq!(c.increment_strong(), MAX_REFCOUNT);
        let message = crate::test::fatal_message(|| {
            c.increment_strong();
        });
        assert_eq!(message.as_deref(), Some("fatal: reference counter overflow"));

        let a = ReferenceCounter::<ThreadSafe>::with_counts(MAX_REFCOUNT + 1, 0);
        let message = crate::test::fatal_message(|| {
            a.increment_strong_unless_zero();
        });
        assert_eq!(message.as_deref(), Some("fatal: reference counter overflow"));

        let w = ReferenceCounter::<ThreadSafe>::with_counts(1, MAX_REFCOUNT);
        let message = crate::test::fatal_message(|| {
            w.increment_weak();
        });
        assert_eq!(message.as_deref(), Some("fatal: reference counter overflow"));
    }

    #[test]
    fn increment_unless_zero_reports_previous_value() {
        let c: Cell<usize> = Count::new(0);
        assert_eq!(c.increment_unless_zero(), None);
        c.set(usize::MAX);
        assert_eq!(c.increment_unless_zero(), Some(usize::MAX));
        assert_eq!(c.get(), 0);

        let a: Atomic<usize> = Count::new(4);
        assert_eq!(Count::increment_unless_zero(&a), Some(4));
        assert_eq!(Count::load(&a), 5);
    }
}
