//! Generic stable-key entity registry.
//!
//! Every heterogeneous entity kind in `World` (players, projectiles,
//! explosions, ...) lives in its own `EntityRegistry<T>`. The registry hands
//! out small integer ids that stay valid across a tick's updates even while
//! entities are reserved or erased mid-tick; new entities only become
//! visible, and erased ids only become reusable, at the next `commit()`.
//!
//! This is the "stable-slot" pattern from the design notes: each entity
//! lives behind its own `Option<T>` cell in a flat `Vec`, so the outer
//! container can grow without moving existing entities, and erasing one
//! entity never invalidates another's id.

use std::marker::PhantomData;

/// A small integer id into an [`EntityRegistry<T>`].
///
/// Parameterized by `T` so ids from different registries cannot be
/// accidentally mixed up at the type level (a `Id<Player>` cannot be passed
/// where an `Id<Projectile>` is expected).
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub fn index(self) -> u32 {
        self.index
    }
}

impl<T> std::fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.index)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> serde::Serialize for Id<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.index.serialize(serializer)
    }
}

impl<'de, T> serde::Deserialize<'de> for Id<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Id::new(u32::deserialize(deserializer)?))
    }
}

/// Generic registry mapping stable [`Id<T>`]s to `Option<T>` slots.
///
/// Lifecycle per tick:
/// - `reserve()` allocates an id and a default-initialized slot, but the
///   entity stays invisible to `find`/`live`/`stable` until the next commit.
/// - `erase()` clears a live slot immediately (visible right away to every
///   other system this tick) but the id is not handed back out until the
///   next commit.
/// - `commit()` is the single barrier: it promotes every slot reserved since
///   the last commit, and frees every id erased since the last commit. It
///   must be called once per tick, at the top level, never from inside an
///   update method.
pub struct EntityRegistry<T> {
    slots: Vec<Option<T>>,
    committed: Vec<bool>,
    free: Vec<u32>,
}

impl<T> Default for EntityRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            committed: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T: Default> EntityRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a new entity slot and returns its id plus a mutable
    /// reference to the default-constructed value for the caller to fill
    /// in. The entity is not visible via `find`/`live`/`stable` until the
    /// next `commit()`.
    pub fn reserve(&mut self) -> (Id<T>, &mut T) {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(None);
                self.committed.push(false);
                (self.slots.len() - 1) as u32
            }
        };
        self.slots[index as usize] = Some(T::default());
        self.committed[index as usize] = false;
        (Id::new(index), self.slots[index as usize].as_mut().unwrap())
    }

    /// Clears a live slot. The id remains poisoned (neither live nor
    /// reusable) until the next `commit()`.
    pub fn erase(&mut self, id: Id<T>) {
        if let Some(slot) = self.slots.get_mut(id.index as usize) {
            *slot = None;
        }
    }

    /// Looks up a committed, live entity.
    pub fn find(&self, id: Id<T>) -> Option<&T> {
        if *self.committed.get(id.index as usize)? {
            self.slots[id.index as usize].as_ref()
        } else {
            None
        }
    }

    /// Looks up a committed, live entity mutably.
    pub fn find_mut(&mut self, id: Id<T>) -> Option<&mut T> {
        if *self.committed.get(id.index as usize)? {
            self.slots[id.index as usize].as_mut()
        } else {
            None
        }
    }

    /// Promotes every reserved-but-uncommitted slot and frees every id
    /// erased since the previous commit. This is the single iterator
    /// invalidation barrier for the registry.
    pub fn commit(&mut self) {
        for index in 0..self.slots.len() {
            match (self.committed[index], self.slots[index].is_some()) {
                (false, true) => self.committed[index] = true,
                (true, false) => {
                    self.committed[index] = false;
                    self.free.push(index as u32);
                }
                _ => {}
            }
        }
    }

    /// Iterates over every committed, live entity.
    pub fn live(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.slots
            .iter()
            .zip(self.committed.iter())
            .enumerate()
            .filter_map(|(index, (slot, committed))| {
                if *committed {
                    slot.as_ref().map(|v| (Id::new(index as u32), v))
                } else {
                    None
                }
            })
    }

    /// Iterates over every committed slot (live or erased-but-not-yet-freed)
    /// with mutable access to the `Option`, so handlers can erase safely
    /// mid-iteration.
    pub fn stable(&mut self) -> impl Iterator<Item = (Id<T>, &mut Option<T>)> {
        self.slots
            .iter_mut()
            .zip(self.committed.iter())
            .enumerate()
            .filter_map(|(index, (slot, committed))| {
                if *committed {
                    Some((Id::new(index as u32), slot))
                } else {
                    None
                }
            })
    }

    /// Number of committed, live entities.
    pub fn len(&self) -> usize {
        self.committed
            .iter()
            .zip(self.slots.iter())
            .filter(|(c, s)| **c && s.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Debug, PartialEq)]
    struct Dummy {
        value: i32,
    }

    #[test]
    fn reserve_is_invisible_until_commit() {
        let mut reg = EntityRegistry::<Dummy>::new();
        let (id, slot) = reg.reserve();
        slot.value = 42;
        assert!(reg.find(id).is_none());
        reg.commit();
        assert_eq!(reg.find(id), Some(&Dummy { value: 42 }));
    }

    #[test]
    fn erase_is_visible_immediately_but_id_stays_poisoned_until_commit() {
        let mut reg = EntityRegistry::<Dummy>::new();
        let (id, _) = reg.reserve();
        reg.commit();
        assert!(reg.find(id).is_some());

        reg.erase(id);
        assert!(reg.find(id).is_none());

        // Reserve again before commit: must not alias the erased id.
        let (other, _) = reg.reserve();
        assert_ne!(id, other);

        reg.commit();
        assert!(reg.find(id).is_none());
    }

    #[test]
    fn freed_id_is_eventually_reused() {
        let mut reg = EntityRegistry::<Dummy>::new();
        let (id, _) = reg.reserve();
        reg.commit();
        reg.erase(id);
        reg.commit(); // id now in free list

        let (reused, _) = reg.reserve();
        assert_eq!(reused.index(), id.index());
    }

    #[test]
    fn stable_iteration_allows_erase() {
        let mut reg = EntityRegistry::<Dummy>::new();
        let (a, _) = reg.reserve();
        let (b, _) = reg.reserve();
        reg.commit();

        for (id, slot) in reg.stable() {
            if id == a {
                *slot = None;
            }
        }

        // find() reads the slot directly, so clearing it is visible immediately,
        // independent of commit().
        assert!(reg.find(a).is_none());
        reg.commit();
        assert!(reg.find(a).is_none());
        assert!(reg.find(b).is_some());
    }

    #[test]
    fn live_only_yields_committed_entities() {
        let mut reg = EntityRegistry::<Dummy>::new();
        let (_, slot) = reg.reserve();
        slot.value = 7;
        assert_eq!(reg.live().count(), 0);
        reg.commit();
        assert_eq!(reg.live().count(), 1);
    }
}
