use base::borrow::{self, BorrowMut};
use base::fmt;
use base::ops::{Deref, DerefMut};
use base::ptr::NonNull;

use base::prelude::v1::*;

use crate::counter::ThreadSafety;
use crate::upcast::Upcast;
use crate::{Shared, SharedRef};

/// The single owner of an object. No counter is involved.
///
/// Dropping the handle destroys the object; moving it moves the ownership. It cannot be copied.
/// [`Exclusive::release_ownership`] is the only way to take the object out without destroying it.
pub struct Exclusive<T: ?Sized>(Box<T>);

impl<T: ?Sized> Exclusive<T> {
    pub fn new(value: T) -> Self
    where
        T: Sized,
    {
        Exclusive(Box::new(value))
    }

    pub fn from_box(object: Box<T>) -> Self {
        Exclusive(object)
    }

    /// Takes ownership of the object behind `ptr`, or returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Exclusive(unsafe { Box::from_raw(ptr.as_ptr()) }))
    }

    /// Hands the object back to the caller without destroying it.
    pub fn release_ownership(this: Self) -> Box<T> {
        this.0
    }

    /// Like [`Exclusive::release_ownership`], as a raw pointer the caller now owns.
    pub fn into_raw(this: Self) -> *mut T {
        Box::into_raw(this.0)
    }

    /// Views the object as a `U`, typically a trait object.
    pub fn upcast<U: ?Sized>(this: Self) -> Exclusive<U>
    where
        T: Upcast<U>,
    {
        let ptr = <T as Upcast<U>>::upcast(NonNull::from(Box::leak(this.0)));
        Exclusive(unsafe { Box::from_raw(ptr.as_ptr()) })
    }
}

impl<T: ?Sized> Deref for Exclusive<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> DerefMut for Exclusive<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: ?Sized> borrow::Borrow<T> for Exclusive<T> {
    fn borrow(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized> BorrowMut<T> for Exclusive<T> {
    fn borrow_mut(&mut self) -> &mut T {
        &mut **self
    }
}

impl<T: ?Sized> AsRef<T> for Exclusive<T> {
    fn as_ref(&self) -> &T {
        &**self
    }
}

impl<T: ?Sized> AsMut<T> for Exclusive<T> {
    fn as_mut(&mut self) -> &mut T {
        &mut **self
    }
}

impl<T: Default> Default for Exclusive<T> {
    fn default() -> Self {
        Exclusive::new(Default::default())
    }
}

impl<T: ?Sized> From<Box<T>> for Exclusive<T> {
    fn from(object: Box<T>) -> Self {
        Exclusive(object)
    }
}

impl<T: ?Sized, M: ThreadSafety> From<Exclusive<T>> for SharedRef<T, M> {
    /// Hands the object over to shared ownership under a fresh counter.
    fn from(exclusive: Exclusive<T>) -> Self {
        SharedRef::from_box(exclusive.0)
    }
}

impl<T: ?Sized, M: ThreadSafety> From<Exclusive<T>> for Shared<T, M> {
    fn from(exclusive: Exclusive<T>) -> Self {
        Shared::from_box(exclusive.0)
    }
}

impl<T: ?Sized + fmt::Display> fmt::Display for Exclusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Exclusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<T: ?Sized> fmt::Pointer for Exclusive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&(&**self as *const T), f)
    }
}
