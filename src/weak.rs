use base::fmt;
use base::hash::{Hash, Hasher};
use base::mem::ManuallyDrop;
use base::ptr::NonNull;

use crate::counter::{ReferenceCounter, SingleThreaded, ThreadSafe, ThreadSafety};
use crate::link::{Link, WeakCount};
use crate::upcast::Upcast;
use crate::{ReferenceCounted, Shared, SharedRef};

/// A handle that observes an object without keeping it alive.
///
/// A `Weak` holds a weak count, which keeps the counter record alive but not the object. The object
/// can only be reached by [locking](Weak::lock) the handle into a [`Shared`].
pub struct Weak<T: ?Sized, M: ThreadSafety = SingleThreaded> {
    pub(crate) link: Link<T, M>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Weak<T, ThreadSafe> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Weak<T, ThreadSafe> {}

impl<T: ?Sized, M: ThreadSafety> Weak<T, M> {
    /// A handle that observes nothing. Allocates nothing.
    pub const fn new() -> Self {
        Weak { link: Link::empty() }
    }

    pub(crate) fn from_link(link: Link<T, M>) -> Self {
        Weak { link }
    }

    fn attach(ptr: Option<NonNull<T>>, counter: Option<NonNull<ReferenceCounter<M>>>) -> Self {
        let link = Link::from_parts(ptr, counter);
        link.increase_counter::<WeakCount>();
        Weak { link }
    }

    /// Promotes to a strong handle if the object is still alive, otherwise returns an empty
    /// [`Shared`].
    ///
    /// The strong count is raised in one compare-and-increment that refuses to move it off zero,
    /// so an object whose last strong handle is being dropped concurrently is never resurrected.
    pub fn lock(&self) -> Shared<T, M> {
        match (self.link.ptr(), self.link.counter()) {
            (Some(ptr), Some(counter)) if counter.increment_strong_unless_zero() => {
                Shared::from_link(Link::from_parts(Some(ptr), self.link.counter_ptr()))
            }
            _ => Shared::empty(),
        }
    }

    /// Whether the object is gone, or the handle never observed one.
    pub fn expired(&self) -> bool {
        !self.is_valid()
    }

    pub fn is_valid(&self) -> bool {
        self.link.is_valid()
    }

    /// Stops observing, leaving the handle empty.
    pub fn reset(&mut self) {
        self.link.release::<WeakCount>();
    }

    /// Observes the object of `other` instead, releasing the current counter.
    pub fn assign_from<S: ?Sized + Upcast<T>>(&mut self, other: &Shared<S, M>) {
        self.link.assign::<WeakCount>(
            other.link.ptr().map(<S as Upcast<T>>::upcast),
            other.link.counter_ptr(),
        );
    }

    /// Observes the object of `other` instead, releasing the current counter.
    pub fn assign_from_ref<S: ?Sized + Upcast<T>>(&mut self, other: &SharedRef<S, M>) {
        self.link.assign::<WeakCount>(
            other.link.ptr().map(<S as Upcast<T>>::upcast),
            other.link.counter_ptr(),
        );
    }

    /// Observes what `other` observes, releasing the current counter.
    pub fn assign_from_weak<S: ?Sized + Upcast<T>>(&mut self, other: &Weak<S, M>) {
        self.link.assign::<WeakCount>(
            other.link.ptr().map(<S as Upcast<T>>::upcast),
            other.link.counter_ptr(),
        );
    }

    /// Views the observed object as a `U`. No count changes.
    pub fn upcast<U: ?Sized>(self) -> Weak<U, M>
    where
        T: Upcast<U>,
    {
        let mut this = ManuallyDrop::new(self);
        Weak { link: this.link.take().upcast() }
    }

    /// The observed address. It dangles once the handle has expired.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.link.ptr()
    }

    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.link.addr() == other.link.addr()
    }
}

impl<T: ?Sized, M: ThreadSafety> From<&Shared<T, M>> for Weak<T, M> {
    fn from(shared: &Shared<T, M>) -> Self {
        Weak::attach(shared.link.ptr(), shared.link.counter_ptr())
    }
}

impl<T: ?Sized, M: ThreadSafety> From<&SharedRef<T, M>> for Weak<T, M> {
    fn from(shared_ref: &SharedRef<T, M>) -> Self {
        Weak::attach(shared_ref.link.ptr(), shared_ref.link.counter_ptr())
    }
}

impl<T: ?Sized, M: ThreadSafety> Clone for Weak<T, M> {
    fn clone(&self) -> Self {
        Weak::attach(self.link.ptr(), self.link.counter_ptr())
    }
}

impl<T: ?Sized, M: ThreadSafety> Drop for Weak<T, M> {
    fn drop(&mut self) {
        self.link.decrease_counter::<WeakCount>();
    }
}

impl<T: ?Sized, M: ThreadSafety> Default for Weak<T, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, M: ThreadSafety> ReferenceCounted for Weak<T, M> {
    fn strong_count(this: &Self) -> usize {
        this.link.strong_count()
    }

    fn weak_count(this: &Self) -> usize {
        this.link.weak_count()
    }
}

impl<T: ?Sized, M: ThreadSafety> PartialEq for Weak<T, M> {
    /// Compares the observed addresses only.
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(self, other)
    }
}

impl<T: ?Sized, M: ThreadSafety> Eq for Weak<T, M> {}

impl<T: ?Sized, M: ThreadSafety> Hash for Weak<T, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.link.addr().hash(state)
    }
}

impl<T: ?Sized, M: ThreadSafety> fmt::Debug for Weak<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(Weak)")
    }
}
