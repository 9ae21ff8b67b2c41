//! Bounded object pools with scope-enforced release.
//!
//! `ObjectPool::acquire` hands out a `Pooled<T>` guard. Dropping the guard resets the
//! object and puts it back on the pool's idle queue, or frees it if the queue is
//! already full. A guard that must reach several concurrent consumers is converted
//! into a `Shared<T>`: every clone is one more reference, and the object goes back to
//! the pool only when the last clone is dropped. Reuse of a buffer that is still
//! referenced is therefore impossible, and forgetting to release is not a concern.

use crossbeam_queue::ArrayQueue;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Objects that can be recycled through an `ObjectPool`.
pub trait Recyclable: Default + Send + 'static {
    /// Clears all state so the next user sees a fresh object.
    fn reset(&mut self);
}

struct PoolInner<T> {
    idle: ArrayQueue<Box<T>>,
    allocated: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
    outstanding: AtomicUsize,
}

impl<T: Recyclable> PoolInner<T> {
    fn release(&self, mut value: Box<T>) {
        value.reset();
        self.outstanding.fetch_sub(1, Ordering::Relaxed);
        match self.idle.push(value) {
            Ok(()) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Usage counters for a pool.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub outstanding: usize,
    pub allocated: usize,
    pub recycled: usize,
    pub discarded: usize,
}

/// Bounded pool of reusable objects.
///
/// `capacity` bounds the idle objects kept for reuse, not the number checked out:
/// `acquire` on an empty pool allocates rather than blocking or failing. Under a burst
/// the pool therefore allocates like a plain `Box::default()`, and objects returned
/// beyond `capacity` are dropped (counted in `discarded`). Steady-state traffic within
/// `capacity` allocates nothing.
pub struct ObjectPool<T: Recyclable> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Recyclable> ObjectPool<T> {
    /// Creates a pool retaining at most `capacity` idle objects.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                idle: ArrayQueue::new(capacity.max(1)),
                allocated: AtomicUsize::new(0),
                recycled: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    /// Checks out an object, allocating a new one only when no idle object is available.
    pub fn acquire(&self) -> Pooled<T> {
        let value = match self.inner.idle.pop() {
            Some(value) => value,
            None => {
                self.inner.allocated.fetch_add(1, Ordering::Relaxed);
                Box::default()
            }
        };
        self.inner.outstanding.fetch_add(1, Ordering::Relaxed);
        Pooled {
            value: Some(value),
            pool: self.inner.clone(),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.inner.idle.capacity(),
            idle: self.inner.idle.len(),
            outstanding: self.inner.outstanding.load(Ordering::Relaxed),
            allocated: self.inner.allocated.load(Ordering::Relaxed),
            recycled: self.inner.recycled.load(Ordering::Relaxed),
            discarded: self.inner.discarded.load(Ordering::Relaxed),
        }
    }
}

impl<T: Recyclable> Clone for ObjectPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Exclusive handle on a pooled object.
pub struct Pooled<T: Recyclable> {
    value: Option<Box<T>>,
    pool: Arc<PoolInner<T>>,
}

impl<T: Recyclable> Pooled<T> {
    /// Converts into a reference-counted handle for fan-out to several consumers.
    pub fn share(self) -> Shared<T> {
        Shared(Arc::new(self))
    }
}

impl<T: Recyclable> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the value.
        self.value.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Recyclable> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Recyclable> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}

/// Read-only, reference-counted handle on a pooled object.
///
/// Cloning hands another consumer a reference; the object returns to its pool when the
/// final clone is dropped.
pub struct Shared<T: Recyclable>(Arc<Pooled<T>>);

impl<T: Recyclable> Shared<T> {
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl<T: Recyclable> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Recyclable> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
