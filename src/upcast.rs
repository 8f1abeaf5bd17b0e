use base::ptr::NonNull;

/// Converts a pointer to `Self` into a pointer to a type `Self` may be viewed as, typically a
/// trait object it implements.
///
/// Handles use this to move between managed types of one hierarchy, e.g. from
/// `Shared<Circle>` to `Shared<dyn Shape>`. Every type converts to itself; other conversions are
/// generated with [`impl_upcast!`](crate::impl_upcast).
///
/// # Safety
///
/// `upcast` must return a pointer to the same allocation that is valid to reconstruct as a
/// `Box<U>`, since handles free the managed object through the converted pointer. Unsizing
/// coercions satisfy this.
pub unsafe trait Upcast<U: ?Sized> {
    fn upcast(ptr: NonNull<Self>) -> NonNull<U>;
}

unsafe impl<T: ?Sized> Upcast<T> for T {
    #[inline]
    fn upcast(ptr: NonNull<T>) -> NonNull<T> {
        ptr
    }
}

/// Implements [`Upcast`] for unsizing conversions.
///
/// ```
/// use shared_ownership::{impl_upcast, Shared};
///
/// trait Shape {
///     fn area(&self) -> f64;
/// }
///
/// struct Square(f64);
///
/// impl Shape for Square {
///     fn area(&self) -> f64 {
///         self.0 * self.0
///     }
/// }
///
/// impl_upcast!(Square => dyn Shape);
///
/// let square: Shared<Square> = Shared::new(Square(2.0));
/// let shape: Shared<dyn Shape> = square.upcast();
/// assert_eq!(shape.get().map(|s| s.area()), Some(4.0));
/// ```
#[macro_export]
macro_rules! impl_upcast {
    ($($from:ty => $to:ty),* $(,)?) => {$(
        unsafe impl $crate::Upcast<$to> for $from {
            #[inline]
            fn upcast(ptr: ::core::ptr::NonNull<Self>) -> ::core::ptr::NonNull<$to> {
                ptr
            }
        }
    )*};
}
