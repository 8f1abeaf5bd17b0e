use base::any::Any;

use base::fmt;
use base::hash::{Hash, Hasher};
use base::mem::ManuallyDrop;
use base::ptr::NonNull;

use base::prelude::v1::*;

use crate::counter::{SingleThreaded, ThreadSafe, ThreadSafety};
use crate::fatal::fatal_error;
use crate::link::{Link, StrongCount};
use crate::upcast::Upcast;
use crate::{ReferenceCounted, SharedRef, Weak};

/// A nullable strong handle.
///
/// Every non-empty `Shared` owns one strong count on the counter of its ownership group; the
/// object is destroyed when the last strong handle of the group lets go. An empty handle owns
/// nothing and allocates nothing.
pub struct Shared<T: ?Sized, M: ThreadSafety = SingleThreaded> {
    pub(crate) link: Link<T, M>,
}

unsafe impl<T: ?Sized + Sync + Send> Send for Shared<T, ThreadSafe> {}
unsafe impl<T: ?Sized + Sync + Send> Sync for Shared<T, ThreadSafe> {}

impl<T: ?Sized, M: ThreadSafety> Shared<T, M> {
    /// A handle that does not point at anything yet.
    pub const fn empty() -> Self {
        Shared { link: Link::empty() }
    }

    pub fn new(value: T) -> Self
    where
        T: Sized,
    {
        Self::from_box(Box::new(value))
    }

    /// Takes ownership of `object` under a fresh counter.
    pub fn from_box(object: Box<T>) -> Self {
        Shared { link: Link::adopt(object) }
    }

    /// Takes ownership of the object behind `ptr`. A null pointer gives an empty handle.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must come from [`Box::into_raw`] and must not be owned by anything else.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        match NonNull::new(ptr) {
            Some(ptr) => Self::from_box(unsafe { Box::from_raw(ptr.as_ptr()) }),
            None => Self::empty(),
        }
    }

    pub(crate) fn from_link(link: Link<T, M>) -> Self {
        Shared { link }
    }

    pub(crate) fn into_link(self) -> Link<T, M> {
        let mut this = ManuallyDrop::new(self);
        this.link.take()
    }

    /// Releases the current group and takes ownership of `object` under a fresh counter.
    pub fn assign(&mut self, object: Box<T>) {
        self.link.reassign(object);
    }

    /// Like [`Shared::assign`] for a raw pointer. A null pointer empties the handle, and the
    /// pointer already held is left alone unless the object is zero-sized.
    ///
    /// # Safety
    ///
    /// Same contract as [`Shared::from_raw`].
    pub unsafe fn assign_raw(&mut self, ptr: *mut T) {
        if self.link.holds(ptr) {
            return;
        }

        match NonNull::new(ptr) {
            Some(ptr) => self.assign(unsafe { Box::from_raw(ptr.as_ptr()) }),
            None => self.reset(),
        }
    }

    /// Joins the group of `other`, releasing the current one.
    pub fn assign_from<S: ?Sized + Upcast<T>>(&mut self, other: &Shared<S, M>) {
        self.link.assign::<StrongCount>(
            other.link.ptr().map(<S as Upcast<T>>::upcast),
            other.link.counter_ptr(),
        );
    }

    /// Joins the group of `other`, releasing the current one.
    pub fn assign_from_ref<S: ?Sized + Upcast<T>>(&mut self, other: &SharedRef<S, M>) {
        self.link.assign::<StrongCount>(
            other.link.ptr().map(<S as Upcast<T>>::upcast),
            other.link.counter_ptr(),
        );
    }

    /// Moves the handle out, leaving this one empty. No count changes.
    pub fn take(&mut self) -> Self {
        Shared { link: self.link.take() }
    }

    /// Releases the group and leaves the handle empty.
    pub fn reset(&mut self) {
        self.link.release::<StrongCount>();
    }

    /// Whether the handle points at a live object.
    pub fn is_valid(&self) -> bool {
        self.link.is_valid()
    }

    pub fn get(&self) -> Option<&T> {
        // A non-empty handle holds a strong count, so the object is alive.
        self.link.ptr().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.link.ptr()
    }

    /// Whether both handles point at the same address. Two empty handles are equal, and so are
    /// any two handles to zero-sized objects, which all live at the same dangling address.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.link.addr() == other.link.addr()
    }

    pub fn to_weak(&self) -> Weak<T, M> {
        Weak::from(self)
    }

    /// A non-null handle to the same object.
    ///
    /// Calling this on an empty handle is a fatal error.
    pub fn to_shared_ref(&self) -> SharedRef<T, M> {
        match self.clone().try_into_shared_ref() {
            Ok(shared_ref) => shared_ref,
            Err(_) => fatal_error("an empty Shared cannot be converted into a SharedRef"),
        }
    }

    /// Converts into a non-null handle, handing `self` back if it is empty.
    pub fn try_into_shared_ref(self) -> Result<SharedRef<T, M>, Self> {
        if self.link.ptr().is_some() {
            Ok(SharedRef::from_link(self.into_link()))
        } else {
            Err(self)
        }
    }

    /// Views the object as a `U`, typically a trait object. No count changes.
    pub fn upcast<U: ?Sized>(self) -> Shared<U, M>
    where
        T: Upcast<U>,
    {
        Shared { link: self.into_link().upcast() }
    }
}

macro_rules! downcast {
    ($($any:ty),*) => {$(
        impl<M: ThreadSafety> Shared<$any, M> {
            /// Recovers the concrete type of the object, handing `self` back if it is not a `C`
            /// or the handle is empty.
            pub fn downcast<C: Any>(self) -> Result<Shared<C, M>, Self> {
                if self.get().map_or(false, |object| object.is::<C>()) {
                    Ok(Shared { link: unsafe { self.into_link().cast::<C>() } })
                } else {
                    Err(self)
                }
            }
        }
    )*};
}

downcast!(dyn Any, dyn Any + Send + Sync);

impl<T: ?Sized, M: ThreadSafety> Clone for Shared<T, M> {
    /// Makes another strong handle to the same object, increasing the strong count.
    fn clone(&self) -> Self {
        let link = Link::from_parts(self.link.ptr(), self.link.counter_ptr());
        link.increase_counter::<StrongCount>();
        Shared { link }
    }
}

impl<T: ?Sized, M: ThreadSafety> Drop for Shared<T, M> {
    fn drop(&mut self) {
        self.link.decrease_counter::<StrongCount>();
    }
}

impl<T: ?Sized, M: ThreadSafety> Default for Shared<T, M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized, M: ThreadSafety> ReferenceCounted for Shared<T, M> {
    fn strong_count(this: &Self) -> usize {
        this.link.strong_count()
    }

    fn weak_count(this: &Self) -> usize {
        this.link.weak_count()
    }
}

impl<T: ?Sized, M: ThreadSafety> From<Box<T>> for Shared<T, M> {
    fn from(object: Box<T>) -> Self {
        Self::from_box(object)
    }
}

impl<T: ?Sized, M: ThreadSafety> From<SharedRef<T, M>> for Shared<T, M> {
    fn from(shared_ref: SharedRef<T, M>) -> Self {
        Shared { link: shared_ref.into_link() }
    }
}

impl<T: ?Sized, M: ThreadSafety> PartialEq for Shared<T, M> {
    /// Two `Shared`s are equal if they point at the same object, whatever its value.
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(self, other)
    }
}

impl<T: ?Sized, M: ThreadSafety> PartialEq<SharedRef<T, M>> for Shared<T, M> {
    #[inline]
    fn eq(&self, other: &SharedRef<T, M>) -> bool {
        self.link.addr() == other.link.addr()
    }
}

impl<T: ?Sized, M: ThreadSafety> Eq for Shared<T, M> {}

impl<T: ?Sized, M: ThreadSafety> Hash for Shared<T, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.link.addr().hash(state)
    }
}

impl<T: ?Sized + fmt::Debug, M: ThreadSafety> fmt::Debug for Shared<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(object) => f.debug_tuple("Shared").field(&object).finish(),
            None => f.write_str("Shared(<empty>)"),
        }
    }
}

impl<T: ?Sized, M: ThreadSafety> fmt::Pointer for Shared<T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.link.addr(), f)
    }
}
