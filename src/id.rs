//! # IDs
//!
//! Process-unique, non-zero identifiers, namespaced by a marker type. A
//! [`Unique<T>`] is valid for the lifetime of the process and is never reused,
//! which is what makes it usable as a cache key: equal IDs mean "same thing",
//! unequal IDs mean "must not assume anything".
//!
//! Pictures and drawable generations each draw from their own namespace, so a
//! picture ID and a generation ID may share a numeric value without being
//! related in any way.

use std::sync::atomic::{AtomicU64, Ordering};

// Next available value per namespace. Namespaces are registered lazily, a
// handful of times over the whole program life, so the map is optimized for
// the read path.
static NEXT: parking_lot::RwLock<std::collections::BTreeMap<std::any::TypeId, AtomicU64>> =
    parking_lot::const_rwlock(std::collections::BTreeMap::new());

/// Non-zero identifier, unique within this execution of the program among all
/// `Unique<T>` of the same namespace `T`.
///
/// Order of allocation is not guaranteed, only uniqueness.
pub struct Unique<T: std::any::Any> {
    value: std::num::NonZeroU64,
    _namespace: std::marker::PhantomData<T>,
}

/// Namespace marker for [`Picture`](crate::picture::Picture) identifiers.
pub enum PictureTag {}
/// Namespace marker for [`Drawable`](crate::drawable::Drawable) generations.
pub enum GenerationTag {}

/// Identifier of a picture; unique across every picture ever constructed in
/// this process, placeholders and deserialized pictures included.
pub type PictureId = Unique<PictureTag>;
/// Identifier of one generation of a drawable's content.
pub type GenerationId = Unique<GenerationTag>;

impl<T: std::any::Any> Unique<T> {
    /// Allocate a fresh identifier.
    #[must_use]
    pub fn next() -> Self {
        Self::many(1).next().unwrap()
    }
    /// Allocate `count` identifiers in one reservation. Cheaper than repeated
    /// [`Self::next`] for bulk work. Dropping the iterator early does *not*
    /// return the unused values.
    ///
    /// Exhausting all `u64::MAX - 1` values terminates the process - by then
    /// uniqueness can no longer be upheld.
    pub fn many(count: usize) -> impl ExactSizeIterator<Item = Self> {
        let count_usize = count;
        // usize always fits u64 on supported targets.
        let count = count as u64;
        let ty = std::any::TypeId::of::<T>();
        let start = {
            let read = NEXT.upgradable_read();
            if let Some(next) = read.get(&ty) {
                // Relaxed: uniqueness comes from the atomicity of the add, no
                // other memory is published through this counter.
                next.fetch_add(count, Ordering::Relaxed)
            } else {
                let mut write = parking_lot::RwLockUpgradableReadGuard::upgrade(read);
                // Zero is reserved as the "no id" sentinel everywhere, start at one.
                write.insert(ty, AtomicU64::new(count.wrapping_add(1)));
                1
            }
        };

        if start.wrapping_add(count) <= count {
            // Wrapped. The counter is unrecoverably spent; continuing would
            // eventually hand out duplicates.
            #[cfg(not(test))]
            {
                log::error!("{} identifier space exhausted", std::any::type_name::<T>());
                log::logger().flush();
                std::process::abort();
            }
            #[cfg(test)]
            {
                panic!("{} identifier space exhausted", std::any::type_name::<T>())
            }
        }

        (0..count_usize).map(move |offset| Self {
            // Nonzero upheld by the wrap check above.
            value: std::num::NonZeroU64::new(start + offset as u64).unwrap(),
            _namespace: std::marker::PhantomData,
        })
    }
    /// Raw numeric value. IDs of *different* namespaces may collide numerically.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.value.get()
    }
    pub(crate) fn from_nonzero(value: std::num::NonZeroU64) -> Self {
        Self {
            value,
            _namespace: std::marker::PhantomData,
        }
    }
    pub(crate) fn nonzero(&self) -> std::num::NonZeroU64 {
        self.value
    }
}

impl<T: std::any::Any> Clone for Unique<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T: std::any::Any> Copy for Unique<T> {}
impl<T: std::any::Any> PartialEq for Unique<T> {
    fn eq(&self, other: &Self) -> bool {
        // Namespaces already match at compile time.
        self.value == other.value
    }
}
impl<T: std::any::Any> Eq for Unique<T> {}
impl<T: std::any::Any> std::hash::Hash for Unique<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::any::TypeId::of::<T>().hash(state);
        self.value.hash(state);
    }
}
// A `Unique<T>` stores no T; don't inherit T's auto traits.
unsafe impl<T: std::any::Any> Send for Unique<T> {}
unsafe impl<T: std::any::Any> Sync for Unique<T> {}

impl<T: std::any::Any> std::fmt::Display for Unique<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // rsplit of a non-empty str always yields at least once.
        write!(
            f,
            "{}#{}",
            std::any::type_name::<T>().rsplit("::").next().unwrap(),
            self.value
        )
    }
}
impl<T: std::any::Any> std::fmt::Debug for Unique<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}
