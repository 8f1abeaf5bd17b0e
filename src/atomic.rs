//! A fixed-width atomic cell with an explicit memory ordering on every operation.
//!
//! Each [`AtomicValue`] picks its storage at compile time: the matching `core` atomic when the
//! target has native instructions of that width, otherwise a [`Locked`] cell that serializes every
//! access behind a spin lock. A locked cell is always sequentially consistent, whatever ordering is
//! requested. The `emulated-atomics` feature forces the locked storage for every width.

use base::fmt;
use base::ops::{AddAssign, SubAssign};
use base::sync::atomic::{self, Ordering};

use spin::Mutex;

/// Ordering constraints of an atomic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOrder {
    Relaxed,
    /// Served as [`MemoryOrder::Acquire`].
    Consume,
    Acquire,
    Release,
    AcquireRelease,
    SequentiallyConsistent,
}

impl Default for MemoryOrder {
    fn default() -> Self {
        MemoryOrder::SequentiallyConsistent
    }
}

impl MemoryOrder {
    fn read_modify_write(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Consume | MemoryOrder::Acquire => Ordering::Acquire,
            MemoryOrder::Release => Ordering::Release,
            MemoryOrder::AcquireRelease => Ordering::AcqRel,
            MemoryOrder::SequentiallyConsistent => Ordering::SeqCst,
        }
    }

    // A load cannot release; asking it to is strengthened to sequential consistency.
    fn load(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Consume | MemoryOrder::Acquire | MemoryOrder::AcquireRelease => {
                Ordering::Acquire
            }
            MemoryOrder::Release | MemoryOrder::SequentiallyConsistent => Ordering::SeqCst,
        }
    }

    // A store cannot acquire; same strengthening as for loads.
    fn store(self) -> Ordering {
        match self {
            MemoryOrder::Relaxed => Ordering::Relaxed,
            MemoryOrder::Release | MemoryOrder::AcquireRelease => Ordering::Release,
            MemoryOrder::Consume | MemoryOrder::Acquire | MemoryOrder::SequentiallyConsistent => {
                Ordering::SeqCst
            }
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// Wrapping integer arithmetic needed by the lock-guarded fallback.
pub trait Integer: Copy + Eq + private::Sealed {
    const ZERO: Self;
    const ONE: Self;

    fn wrapping_add(self, rhs: Self) -> Self;

    fn wrapping_neg(self) -> Self;
}

/// Backing store of an [`Atomic`].
pub trait AtomicStorage<V>: Sized {
    /// Whether the operations compile down to native atomic instructions.
    const LOCK_FREE: bool;

    fn new(value: V) -> Self;

    fn load(&self, order: MemoryOrder) -> V;

    fn store(&self, value: V, order: MemoryOrder);

    /// Adds `delta` with wrap-around and returns the previous value.
    fn fetch_add(&self, delta: V, order: MemoryOrder) -> V;

    /// Replaces the value with `new` if it equals `current`. Returns the previous value on
    /// success and the value actually found on failure.
    fn compare_exchange(&self, current: V, new: V, order: MemoryOrder) -> Result<V, V>;

    fn into_inner(self) -> V;
}

/// A value whose width has an [`Atomic`] representation.
pub trait AtomicValue: Integer {
    type Storage: AtomicStorage<Self>;
}

/// Fallback storage: a plain value whose every access is done under a spin lock.
pub struct Locked<V> {
    value: Mutex<V>,
}

impl<V: Integer> AtomicStorage<V> for Locked<V> {
    const LOCK_FREE: bool = false;

    fn new(value: V) -> Self {
        Locked { value: Mutex::new(value) }
    }

    fn load(&self, _order: MemoryOrder) -> V {
        *self.value.lock()
    }

    fn store(&self, value: V, _order: MemoryOrder) {
        *self.value.lock() = value;
    }

    fn fetch_add(&self, delta: V, _order: MemoryOrder) -> V {
        let mut value = self.value.lock();
        let previous = *value;
        *value = previous.wrapping_add(delta);
        previous
    }

    fn compare_exchange(&self, current: V, new: V, _order: MemoryOrder) -> Result<V, V> {
        let mut value = self.value.lock();
        let previous = *value;
        if previous == current {
            *value = new;
            Ok(previous)
        } else {
            Err(previous)
        }
    }

    fn into_inner(self) -> V {
        self.value.into_inner()
    }
}

macro_rules! integer {
    ($($value:ty),* $(,)?) => {$(
        impl private::Sealed for $value {}

        impl Integer for $value {
            const ZERO: Self = 0;
            const ONE: Self = 1;

            #[inline]
            fn wrapping_add(self, rhs: Self) -> Self {
                <$value>::wrapping_add(self, rhs)
            }

            #[inline]
            fn wrapping_neg(self) -> Self {
                <$value>::wrapping_neg(self)
            }
        }
    )*};
}

integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! native {
    ($($value:ty => $native:ident, $width:tt;)*) => {$(
        #[cfg(target_has_atomic = $width)]
        impl AtomicStorage<$value> for atomic::$native {
            const LOCK_FREE: bool = true;

            #[inline]
            fn new(value: $value) -> Self {
                atomic::$native::new(value)
            }

            #[inline]
            fn load(&self, order: MemoryOrder) -> $value {
                atomic::$native::load(self, order.load())
            }

            #[inline]
            fn store(&self, value: $value, order: MemoryOrder) {
                atomic::$native::store(self, value, order.store())
            }

            #[inline]
            fn fetch_add(&self, delta: $value, order: MemoryOrder) -> $value {
                atomic::$native::fetch_add(self, delta, order.read_modify_write())
            }

            #[inline]
            fn compare_exchange(
                &self,
                current: $value,
                new: $value,
                order: MemoryOrder,
            ) -> Result<$value, $value> {
                atomic::$native::compare_exchange(
                    self,
                    current,
                    new,
                    order.read_modify_write(),
                    order.load(),
                )
            }

            #[inline]
            fn into_inner(self) -> $value {
                atomic::$native::into_inner(self)
            }
        }

        #[cfg(all(target_has_atomic = $width, not(feature = "emulated-atomics")))]
        impl AtomicValue for $value {
            type Storage = atomic::$native;
        }

        #[cfg(any(not(target_has_atomic = $width), feature = "emulated-atomics"))]
        impl AtomicValue for $value {
            type Storage = Locked<$value>;
        }
    )*};
}

native! {
    i8 => AtomicI8, "8";
    u8 => AtomicU8, "8";
    i16 => AtomicI16, "16";
    u16 => AtomicU16, "16";
    i32 => AtomicI32, "32";
    u32 => AtomicU32, "32";
    i64 => AtomicI64, "64";
    u64 => AtomicU64, "64";
    isize => AtomicIsize, "ptr";
    usize => AtomicUsize, "ptr";
}

/// An integer that may be shared between threads and mutated through `&self`.
pub struct Atomic<V: AtomicValue> {
    storage: V::Storage,
}

impl<V: AtomicValue> Atomic<V> {
    pub fn new(value: V) -> Self {
        Atomic { storage: V::Storage::new(value) }
    }

    /// Whether this width is backed by native instructions rather than a lock.
    pub fn is_lock_free() -> bool {
        <V::Storage as AtomicStorage<V>>::LOCK_FREE
    }

    #[inline]
    pub fn load(&self, order: MemoryOrder) -> V {
        self.storage.load(order)
    }

    #[inline]
    pub fn store(&self, value: V, order: MemoryOrder) {
        self.storage.store(value, order)
    }

    /// Adds `delta`, wrapping around on overflow, and returns the previous value.
    #[inline]
    pub fn fetch_add(&self, delta: V, order: MemoryOrder) -> V {
        self.storage.fetch_add(delta, order)
    }

    /// Subtracts `delta`, wrapping around on overflow, and returns the previous value.
    #[inline]
    pub fn fetch_sub(&self, delta: V, order: MemoryOrder) -> V {
        self.fetch_add(delta.wrapping_neg(), order)
    }

    /// Stores `new` if the current value is `current`.
    ///
    /// Returns `Ok` with the previous value if the exchange happened and `Err` with the value
    /// observed otherwise.
    #[inline]
    pub fn compare_exchange(&self, current: V, new: V, order: MemoryOrder) -> Result<V, V> {
        self.storage.compare_exchange(current, new, order)
    }

    /// Adds one and returns the new value.
    pub fn increment(&self) -> V {
        self.fetch_add(V::ONE, MemoryOrder::SequentiallyConsistent)
            .wrapping_add(V::ONE)
    }

    /// Subtracts one and returns the new value.
    pub fn decrement(&self) -> V {
        self.fetch_sub(V::ONE, MemoryOrder::SequentiallyConsistent)
            .wrapping_add(V::ONE.wrapping_neg())
    }

    pub fn into_inner(self) -> V {
        self.storage.into_inner()
    }
}

impl<V: AtomicValue> Default for Atomic<V> {
    fn default() -> Self {
        Atomic::new(V::ZERO)
    }
}

impl<V: AtomicValue> From<V> for Atomic<V> {
    fn from(value: V) -> Self {
        Atomic::new(value)
    }
}

impl<V: AtomicValue> AddAssign<V> for Atomic<V> {
    fn add_assign(&mut self, delta: V) {
        self.fetch_add(delta, MemoryOrder::SequentiallyConsistent);
    }
}

impl<V: AtomicValue> SubAssign<V> for Atomic<V> {
    fn sub_assign(&mut self, delta: V) {
        self.fetch_sub(delta, MemoryOrder::SequentiallyConsistent);
    }
}

impl<V: AtomicValue + fmt::Debug> fmt::Debug for Atomic<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atomic")
            .field(&self.load(MemoryOrder::SequentiallyConsistent))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    const ORDERS: [MemoryOrder; 6] = [
        MemoryOrder::Relaxed,
        MemoryOrder::Consume,
        MemoryOrder::Acquire,
        MemoryOrder::Release,
        MemoryOrder::AcquireRelease,
        MemoryOrder::SequentiallyConsistent,
    ];

    #[test]
    fn fetch_add_returns_previous_value() {
        let a = Atomic::new(5i32);
        assert_eq!(a.fetch_add(3, MemoryOrder::SequentiallyConsistent), 5);
        assert_eq!(a.load(MemoryOrder::Acquire), 8);
        assert_eq!(a.fetch_sub(10, MemoryOrder::Relaxed), 8);
        assert_eq!(a.load(MemoryOrder::Relaxed), -2);
    }

    #[test]
    fn every_order_is_accepted_by_every_operation() {
        let a = Atomic::new(0u64);
        for order in ORDERS {
            a.store(7, order);
            assert_eq!(a.load(order), 7);
            assert_eq!(a.fetch_add(1, order), 7);
            assert_eq!(a.compare_exchange(8, 0, order), Ok(8));
            assert_eq!(a.compare_exchange(8, 1, order), Err(0));
        }
    }

    #[test]
    fn unsigned_subtraction_wraps() {
        let a = Atomic::new(0u8);
        assert_eq!(a.decrement(), u8::MAX);
        assert_eq!(a.increment(), 0);
    }

    #[test]
    fn compound_assignment() {
        let mut a: Atomic<i16> = Atomic::default();
        a += 40;
        a -= 2;
        assert_eq!(a.into_inner(), 38);
    }

    #[test]
    fn locked_storage_behaves_like_native() {
        let l = <Locked<i64> as AtomicStorage<i64>>::new(i64::MAX);
        assert!(!<Locked<i64> as AtomicStorage<i64>>::LOCK_FREE);
        assert_eq!(l.fetch_add(1, MemoryOrder::Relaxed), i64::MAX);
        assert_eq!(l.load(MemoryOrder::Relaxed), i64::MIN);
        assert_eq!(l.compare_exchange(0, 1, MemoryOrder::Release), Err(i64::MIN));
        assert_eq!(l.compare_exchange(i64::MIN, 1, MemoryOrder::Release), Ok(i64::MIN));
        assert_eq!(l.into_inner(), 1);
    }

    #[cfg(all(target_has_atomic = "ptr", not(feature = "emulated-atomics")))]
    #[test]
    fn native_when_available() {
        assert!(Atomic::<usize>::is_lock_free());
    }

    #[cfg(feature = "emulated-atomics")]
    #[test]
    fn emulated_when_forced() {
        assert!(!Atomic::<usize>::is_lock_free());
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let a = Arc::new(Atomic::new(0usize));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let a = Arc::clone(&a);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        a.fetch_add(1, MemoryOrder::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(a.load(MemoryOrder::SequentiallyConsistent), 80_000);
    }

    #[test]
    fn concurrent_locked_increments_are_not_lost() {
        let l = Arc::new(<Locked<u32> as AtomicStorage<u32>>::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let l = Arc::clone(&l);
                thread::spawn(move || {
                    for _ in 0..5_000 {
                        l.fetch_add(1, MemoryOrder::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(l.load(MemoryOrder::Relaxed), 20_000);
    }
}
