//! Bookkeeping shared by [`Shared`], [`SharedRef`] and [`Weak`]: which counter a handle is
//! attached to, and what happens to the object and the counter when a count goes down.
//!
//! [`Shared`]: crate::Shared
//! [`SharedRef`]: crate::SharedRef
//! [`Weak`]: crate::Weak

use base::marker::PhantomData;
use base::mem;
use base::ptr::NonNull;

use base::prelude::v1::*;

use crate::counter::{ReferenceCounter, ThreadSafety};
use crate::fatal::fatal_error;
use crate::upcast::Upcast;

/// Which of the two counts a handle contributes to.
pub(crate) trait CountKind {
    const STRONG: bool;

    fn increase<M: ThreadSafety>(counter: &ReferenceCounter<M>);

    /// Returns the previous value as seen by the handle, zero meaning underflow.
    fn decrease<M: ThreadSafety>(counter: &ReferenceCounter<M>) -> usize;
}

pub(crate) enum StrongCount {}

pub(crate) enum WeakCount {}

impl CountKind for StrongCount {
    const STRONG: bool = true;

    #[inline]
    fn increase<M: ThreadSafety>(counter: &ReferenceCounter<M>) {
        counter.increment_strong();
    }

    #[inline]
    fn decrease<M: ThreadSafety>(counter: &ReferenceCounter<M>) -> usize {
        counter.decrement_strong()
    }
}

impl CountKind for WeakCount {
    const STRONG: bool = false;

    #[inline]
    fn increase<M: ThreadSafety>(counter: &ReferenceCounter<M>) {
        counter.increment_weak();
    }

    #[inline]
    fn decrease<M: ThreadSafety>(counter: &ReferenceCounter<M>) -> usize {
        counter.decrement_weak()
    }
}

/// The object pointer and counter pointer of one handle.
///
/// Ownership lives entirely in the counter: `ptr` is only what the handle dereferences. Both are
/// `None` for an empty handle. A `Link` never adjusts counts on its own, the handle owning it
/// decides which count it holds.
pub(crate) struct Link<T: ?Sized, M: ThreadSafety> {
    ptr: Option<NonNull<T>>,
    counter: Option<NonNull<ReferenceCounter<M>>>,
    phantom: PhantomData<T>,
}

impl<T: ?Sized, M: ThreadSafety> Link<T, M> {
    pub(crate) const fn empty() -> Self {
        Link { ptr: None, counter: None, phantom: PhantomData }
    }

    /// Takes ownership of `object` under a fresh counter holding one strong count.
    pub(crate) fn adopt(object: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(object));
        Link {
            ptr: Some(ptr),
            counter: Some(ReferenceCounter::new().allocate()),
            phantom: PhantomData,
        }
    }

    pub(crate) fn from_parts(
        ptr: Option<NonNull<T>>,
        counter: Option<NonNull<ReferenceCounter<M>>>,
    ) -> Self {
        Link { ptr, counter, phantom: PhantomData }
    }

    #[inline]
    pub(crate) fn ptr(&self) -> Option<NonNull<T>> {
        self.ptr
    }

    #[inline]
    pub(crate) fn counter_ptr(&self) -> Option<NonNull<ReferenceCounter<M>>> {
        self.counter
    }

    #[inline]
    pub(crate) fn counter(&self) -> Option<&ReferenceCounter<M>> {
        // Any attached handle holds a strong or weak share, which keeps the record alive.
        self.counter.map(|counter| unsafe { &*counter.as_ptr() })
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.ptr.is_some() && self.counter().map_or(false, |c| c.strong_count() > 0)
    }

    /// Whether `ptr` is the object this link holds. A zero-sized object is never considered the
    /// same as another pointer, since every allocation of it has the same address.
    pub(crate) fn holds(&self, ptr: *const T) -> bool {
        match self.ptr {
            Some(held) => {
                // Only strong handles ask, so the object is alive.
                let size = mem::size_of_val(unsafe { held.as_ref() });
                size != 0 && held.as_ptr() as *const u8 == ptr as *const u8
            }
            None => false,
        }
    }

    pub(crate) fn strong_count(&self) -> usize {
        self.counter().map_or(0, ReferenceCounter::strong_count)
    }

    pub(crate) fn weak_count(&self) -> usize {
        self.counter().map_or(0, ReferenceCounter::weak_count)
    }

    /// Address of the object, for pointer comparisons.
    ///
    /// Zero-sized objects all share one dangling address.
    pub(crate) fn addr(&self) -> *const u8 {
        self.ptr.map_or(base::ptr::null(), |ptr| ptr.cast::<u8>().as_ptr() as *const u8)
    }

    pub(crate) fn increase_counter<K: CountKind>(&self) {
        if let Some(counter) = self.counter() {
            K::increase(counter);
        }
    }

    /// Gives up this handle's count.
    ///
    /// Dropping the last strong count destroys the object; dropping the last share of either kind
    /// frees the counter. The link keeps its pointers, so it is only called on a link no handle
    /// will release again: a detached one, or the link of a handle being dropped.
    pub(crate) fn decrease_counter<K: CountKind>(&mut self) {
        let counter = match self.counter {
            Some(counter) => counter,
            None => return,
        };

        match K::decrease(unsafe { counter.as_ref() }) {
            0 => fatal_error("reference counter underflow"),
            1 if K::STRONG => {
                // Runs even when the destructor below unwinds.
                let _share = StrongShare { counter };
                if let Some(ptr) = self.ptr {
                    // The strong count just reached zero and can never rise again, so no other
                    // handle will touch the object.
                    drop(unsafe { Box::from_raw(ptr.as_ptr()) });
                }
            }
            // The last weak share, the strong group's share is already gone.
            1 => unsafe { ReferenceCounter::free(counter) },
            _ => {}
        }
    }

    /// Drops the weak share the strong group held, after the strong count reached zero.
    pub(crate) fn release_strong_share(&self) {
        if let Some(counter) = self.counter {
            release_strong_share(counter);
        }
    }

    /// Attaches to `ptr` and `counter` without registering a count there, then gives up the count
    /// of kind `K` held on the previous counter.
    ///
    /// The handle is already re-pointed when the old object's destructor runs.
    pub(crate) fn set_counter<K: CountKind>(
        &mut self,
        ptr: Option<NonNull<T>>,
        counter: Option<NonNull<ReferenceCounter<M>>>,
    ) {
        let mut old = mem::replace(self, Link::from_parts(ptr, counter));
        old.decrease_counter::<K>();
    }

    /// Re-points this handle at `ptr` within `counter`'s group, holding a count of kind `K` there.
    ///
    /// Nothing is released or registered when the counter stays the same.
    pub(crate) fn assign<K: CountKind>(
        &mut self,
        ptr: Option<NonNull<T>>,
        counter: Option<NonNull<ReferenceCounter<M>>>,
    ) {
        if self.counter == counter {
            self.ptr = ptr;
            return;
        }

        if let Some(counter) = counter {
            K::increase(unsafe { counter.as_ref() });
        }
        self.set_counter::<K>(ptr, counter);
    }

    /// Replaces the object with `object` under a fresh counter, releasing the old group.
    pub(crate) fn reassign(&mut self, object: Box<T>) {
        let fresh = Link::adopt(object);
        self.set_counter::<StrongCount>(fresh.ptr, fresh.counter);
    }

    /// Leaves the link empty, giving up its count of kind `K`.
    pub(crate) fn release<K: CountKind>(&mut self) {
        self.set_counter::<K>(None, None);
    }

    /// Detaches the pointers without touching any count.
    pub(crate) fn take(&mut self) -> Self {
        Link { ptr: self.ptr.take(), counter: self.counter.take(), phantom: PhantomData }
    }

    pub(crate) fn upcast<U: ?Sized>(self) -> Link<U, M>
    where
        T: Upcast<U>,
    {
        Link {
            ptr: self.ptr.map(<T as Upcast<U>>::upcast),
            counter: self.counter,
            phantom: PhantomData,
        }
    }

    /// # Safety
    ///
    /// The object must actually be a `U`.
    pub(crate) unsafe fn cast<U>(self) -> Link<U, M> {
        Link { ptr: self.ptr.map(|ptr| ptr.cast::<U>()), counter: self.counter, phantom: PhantomData }
    }
}

fn release_strong_share<M: ThreadSafety>(counter: NonNull<ReferenceCounter<M>>) {
    if unsafe { counter.as_ref() }.decrement_weak() == 1 {
        unsafe { ReferenceCounter::free(counter) };
    }
}

/// The strong group's weak share, released on drop.
struct StrongShare<M: ThreadSafety> {
    counter: NonNull<ReferenceCounter<M>>,
}

impl<M: ThreadSafety> Drop for StrongShare<M> {
    fn drop(&mut self) {
        release_strong_share(self.counter);
    }
}
