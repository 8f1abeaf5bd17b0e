use base::borrow;
use base::fmt;
use base::hash::{Hash, Hasher};
use base::mem::{ManuallyDrop, MaybeUninit};
use base::ops::Deref;
use base::ptr::NonNull;

use base::prelude::v1::*;

use crate::counter::{ReferenceCounter, SingleThreaded, ThreadSafe, ThreadSafety};
use crate::fatal::fatal_error;
use crate::link::{Link, StrongCount, WeakCount};
use crate::upcast::Upcast;
use crate::{ReferenceCounted, Shared, Weak};

/// A strong handle that always points at an object.
///
/// This is the parameter type for APIs that need the object to exist. It can only be built from
/// an object, so every attempt to make one from a null pointer or an empty [`Shared`] goes to the
/// fatal-error hook instead of producing a dangling handle.
///
/// Like `Arc`, its methods are associated functions (`SharedRef::to_weak(&r)`) so they never
/// shadow methods of `T`.
pub struct SharedRef<T: ?Sized, M: ThreadSafety = SingleThreaded> {
    pub(crate) link: Link<T, M>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for SharedRef<T, ThreadSafe> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for SharedRef<T, ThreadSafe> {}

impl<T: ?Sized, M: ThreadSafety> SharedRef<T, M> {
    pub fn new(value: T) -> Self
    where
        T: Sized,
    {
        Self::from_box(Box::new(value))
    }

    /// Takes ownership of `object` under a fresh counter.
    pub fn from_box(object: Box<T>) -> Self {
        SharedRef { link: Link::adopt(object) }
    }

    /// Takes ownership of the object behind `ptr`. A null pointer is a fatal error.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(ptr) => Self::from_box(unsafe { Box::from_raw(ptr.as_ptr()) }),
            None => fatal_error("SharedRef cannot be initialized with a null pointer"),
        }
    }

    /// Builds the object with a [`Weak`] handle to itself.
    ///
    /// The weak handle cannot be locked until `data_fn` has returned, but it can be cloned into
    /// the object so that the object can later hand out strong handles to itself.
    pub fn new_cyclic<F>(data_fn: F) -> Self
    where
        T: Sized,
        F: FnOnce(&Weak<T, M>) -> T,
    {
        let slot = NonNull::from(Box::leak(Box::new(MaybeUninit::<T>::uninit()))).cast::<T>();
        let counter = ReferenceCounter::<M>::zeroed().allocate();

        let weak = Weak::from_link(Link::from_parts(Some(slot), Some(counter)));
        weak.link.increase_counter::<WeakCount>();

        let value = data_fn(&weak);
        unsafe { slot.as_ptr().write(value) };

        // The strong group's weak share goes in before the strong count, so the record can never
        // be observed with strong handles but without that share.
        let count = unsafe { counter.as_ref() };
        count.increment_weak();
        count.increment_strong();
        drop(weak);

        SharedRef { link: Link::from_parts(Some(slot), Some(counter)) }
    }

    pub(crate) fn from_link(link: Link<T, M>) -> Self {
        debug_assert!(link.ptr().is_some());
        SharedRef { link }
    }

    pub(crate) fn into_link(self) -> Link<T, M> {
        let mut this = ManuallyDrop::new(self);
        this.link.take()
    }

    #[inline]
    fn object(&self) -> NonNull<T> {
        self.link
            .ptr()
            .unwrap_or_else(|| fatal_error("a null SharedRef was detected"))
    }

    /// Releases the current group and takes ownership of `object` under a fresh counter.
    pub fn assign(this: &mut Self, object: Box<T>) {
        this.link.reassign(object);
    }

    /// Like [`SharedRef::assign`] for a raw pointer. A null pointer is a fatal error, and the
    /// pointer already held is left alone unless the object is zero-sized.
    ///
    /// # Safety
    ///
    /// Same contract as [`SharedRef::from_raw`].
    pub unsafe fn assign_raw(this: &mut Self, ptr: *mut T) {
        match NonNull::new(ptr) {
            None => fatal_error("SharedRef cannot be assigned a null pointer"),
            Some(ptr) if this.link.holds(ptr.as_ptr()) => {}
            Some(ptr) => Self::assign(this, unsafe { Box::from_raw(ptr.as_ptr()) }),
        }
    }

    /// Joins the group of `other`, releasing the current one.
    pub fn assign_from<S: ?Sized + Upcast<T>>(this: &mut Self, other: &SharedRef<S, M>) {
        this.link.assign::<StrongCount>(
            Some(<S as Upcast<T>>::upcast(other.object())),
            other.link.counter_ptr(),
        );
    }

    /// Joins the group of `other`, releasing the current one. An empty `other` is a fatal error.
    pub fn assign_from_shared<S: ?Sized + Upcast<T>>(this: &mut Self, other: &Shared<S, M>) {
        match other.link.ptr() {
            Some(ptr) => this.link.assign::<StrongCount>(
                Some(<S as Upcast<T>>::upcast(ptr)),
                other.link.counter_ptr(),
            ),
            None => fatal_error("SharedRef cannot be assigned an empty Shared"),
        }
    }

    pub fn as_ptr(this: &Self) -> NonNull<T> {
        this.object()
    }

    /// Whether both handles point at the same address. Handles to distinct zero-sized objects
    /// compare equal.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.link.addr() == other.link.addr()
    }

    pub fn to_shared(this: &Self) -> Shared<T, M> {
        Shared::from(this.clone())
    }

    pub fn to_weak(this: &Self) -> Weak<T, M> {
        Weak::from(this)
    }

    /// Views the object as a `U`, typically a trait object. No count changes.
    pub fn upcast<U: ?Sized>(this: Self) -> SharedRef<U, M>
    where
        T: Upcast<U>,
    {
        SharedRef { link: this.into_link().upcast() }
    }

    /// Returns the object if `this` is its only strong handle, otherwise hands `this` back.
    ///
    /// Weak handles of the group stay valid as observers and can no longer be locked.
    pub fn try_unwrap(this: Self) -> Result<T, Self>
    where
        T: Sized,
    {
        let unique = this.link.counter().map_or(false, |c| c.compare_exchange_strong(1, 0));
        if !unique {
            return Err(this);
        }

        let link = this.into_link();
        let object = link.ptr().unwrap_or_else(|| fatal_error("a null SharedRef was detected"));
        let value = *unsafe { Box::from_raw(object.as_ptr()) };
        link.release_strong_share();
        Ok(value)
    }
}

impl<T: ?Sized, M: ThreadSafety> Clone for SharedRef<T, M> {
    /// Makes another strong handle to the same object, increasing the strong count.
    fn clone(&self) -> Self {
        let link = Link::from_parts(self.link.ptr(), self.link.counter_ptr());
        link.increase_counter::<StrongCount>();
        SharedRef { link }
    }
}

impl<T: ?Sized, M: ThreadSafety> Drop for SharedRef<T, M> {
    fn drop(&mut self) {
        self.link.decrease_counter::<StrongCount>();
    }
}

impl<T: ?Sized, M: ThreadSafety> Deref for SharedRef<T, M> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // The handle holds a strong count, so the object is alive.
        unsafe { &*self.object().as_ptr() }
    }
}

impl<T: ?Sized, M: ThreadSafety> borrow::Borrow<T> for SharedRef<T, M> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized, M: ThreadSafety> AsRef<T> for SharedRef<T, M> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized, M: ThreadSafety> ReferenceCounted for SharedRef<T, M> {
    fn strong_count(this: &Self) -> usize {
        this.link.strong_count()
    }

    fn weak_count(this: &Self) -> usize {
        this.link.weak_count()
    }
}

impl<T, M: ThreadSafety> From<T> for SharedRef<T, M> {
    fn from(value: T) -> Self {
        SharedRef::new(value)
    }
}

impl<T: ?Sized, M: ThreadSafety> From<Box<T>> for SharedRef<T, M> {
    fn from(object: Box<T>) -> Self {
        SharedRef::from_box(object)
    }
}

impl<T: ?Sized, M: ThreadSafety> PartialEq for SharedRef<T, M> {
    /// Two `SharedRef`s are equal if they point at the same object, whatever its value.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        SharedRef::ptr_eq(self, other)
    }
}

impl<T: ?Sized, M: ThreadSafety> PartialEq<Shared<T, M>> for SharedRef<T, M> {
    #[inline]
    fn eq(&self, other: &Shared<T, M>) -> bool {
        self.link.addr() == other.link.addr()
    }
}

impl<T: ?Sized, M: ThreadSafety> Eq for SharedRef<T, M> {}

impl<T: ?Sized, M: ThreadSafety> Hash for SharedRef<T, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.link.addr().hash(state)
    }
}

impl<T: ?Sized + fmt::Display, M: ThreadSafety> fmt::Display for SharedRef<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Debug, M: ThreadSafety> fmt::Debug for SharedRef<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized, M: ThreadSafety> fmt::Pointer for SharedRef<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.link.addr(), f)
    }
}
