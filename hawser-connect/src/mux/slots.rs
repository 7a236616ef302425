use std::sync::{Arc, RwLock, Weak};

/// A fixed-capacity arena of slots, where the slot index becomes the
/// local channel identifier and the slot is freed automatically once
/// every [`Lease`] (and [`Reservation`]) to it is dropped.
#[derive(Debug)]
pub struct Slots<T> {
    inner: RwLock<Vec<Weak<Option<T>>>>,
}

impl<T> Slots<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new((0..capacity).map(|_| Weak::new()).collect()),
        }
    }

    /// Reserve the lowest free slot, without a value yet.
    pub fn reserve(&self) -> Option<Reservation<'_, T>> {
        self.inner
            .write()
            .expect("The `Slots` lock has been poisoned")
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.strong_count() == 0)
            .map(|(index, slot)| {
                let pointer = Arc::new(None);

                *slot = Arc::downgrade(&pointer);

                Reservation {
                    slots: self,
                    index,
                    _reservation: pointer,
                }
            })
    }

    /// Reserve the lowest free slot and fill it with `value` at once.
    pub fn insert(&self, value: T) -> Option<Lease<T>> {
        self.reserve().map(|reservation| reservation.into_lease(value))
    }

    /// Look up the lease currently occupying `index`, if any.
    pub fn get(&self, index: usize) -> Option<Lease<T>> {
        self.inner
            .read()
            .expect("The `Slots` lock has been poisoned")
            .get(index)
            .and_then(Weak::upgrade)
            .map(|pointer| Lease { index, pointer })
    }
}

/// A reserved, not-yet-occupied slot.
pub struct Reservation<'s, T> {
    slots: &'s Slots<T>,
    index: usize,
    _reservation: Arc<Option<T>>,
}

impl<T> Reservation<'_, T> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Occupy the reserved slot with `value`.
    pub fn into_lease(self, value: T) -> Lease<T> {
        let pointer = Arc::new(Some(value));

        let mut slots = self
            .slots
            .inner
            .write()
            .expect("The `Slots` lock has been poisoned");
        let slot = slots
            .get_mut(self.index)
            .expect("The reservation outlived its `Slots` instance");

        *slot = Arc::downgrade(&pointer);

        Lease {
            index: self.index,
            pointer,
        }
    }
}

/// A handle to an occupied slot, freeing it when every clone is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease<T> {
    index: usize,
    pointer: Arc<Option<T>>,
}

impl<T> Lease<T> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> &T {
        (*self.pointer)
            .as_ref()
            .expect("The `Lease` was constructed over an empty slot")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_reserves_up_to_capacity_and_reuses_freed_slots() {
        let slots = Slots::<()>::new(3);

        let one = slots.reserve();
        let two = slots.insert(());
        let three = slots.reserve();

        assert!(one.is_some());
        assert!(two.is_some());
        assert!(three.is_some());
        assert!(slots.reserve().is_none());

        drop(two);

        let four = slots
            .insert(())
            .expect("Unable to lease a freed slot");

        assert_eq!(four.index(), 1);
    }

    #[test]
    fn it_finds_leases_back_by_index() {
        let slots = Slots::<u32>::new(2);

        let lease = slots.insert(42).expect("Unable to lease a free slot");

        assert_eq!(
            slots
                .get(lease.index())
                .expect("Unable to find the lease back")
                .value(),
            lease.value(),
        );
        assert!(slots.get(usize::MAX).is_none());
    }
}
