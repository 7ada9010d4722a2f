use ahash::AHashMap;
use hibitset::BitSet;

use crate::storage::{TypeTag, UntypedRef};

/// `Entity` type, as seen by the user.
///
/// A thin wrapper around a `u64` id. Ids are allocated monotonically
/// starting at 1 and are never reused within a world, so a dangling
/// `Entity` can always be detected. Id 0 is the reserved null id.
#[derive(Clone, Copy, Debug, Hash, Eq, Ord, PartialEq, PartialOrd)]
pub struct Entity(u64);

impl Entity {
    /// The reserved "no entity" id.
    pub const NULL: Entity = Entity(0);

    pub(crate) const fn new(id: u64) -> Self {
        Entity(id)
    }

    /// Returns the raw id of the `Entity`.
    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` if this is the reserved null id.
    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Default for Entity {
    fn default() -> Self {
        Entity::NULL
    }
}

/// Per-entity index of live components.
///
/// The graph keeps the entity's classification mask, its component
/// handles in insertion order, a per-type index into that sequence, and
/// type-presence bits for O(1) matcher prechecks. Tag indices below 64
/// are mirrored into a `u64` fast mask; the full `BitSet` covers the
/// rest.
#[derive(Debug, Default)]
pub struct EntityGraph {
    mask: u64,
    components: Vec<UntypedRef>,
    type_index: AHashMap<TypeTag, Vec<usize>>,
    type_bits: BitSet,
    fast_bits: u64,
}

impl EntityGraph {
    pub(crate) fn new(mask: u64) -> Self {
        EntityGraph {
            mask,
            ..Default::default()
        }
    }

    /// The user-assigned classification mask, immutable after create.
    #[inline]
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// All live component handles, in insertion order.
    #[inline]
    pub fn components(&self) -> &[UntypedRef] {
        &self.components
    }

    /// Returns `true` if the entity owns no components at all.
    #[inline]
    pub fn is_componentless(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns `true` if at least one component of the given tag is
    /// attached.
    #[inline]
    pub fn contains_tag(&self, tag: TypeTag) -> bool {
        self.type_bits.contains(tag.index())
    }

    /// The `u64` mirror of the presence bits for tag indices below 64.
    #[inline]
    pub fn fast_bits(&self) -> u64 {
        self.fast_bits
    }

    /// The first attached component of the given tag, if any.
    pub fn first_of(&self, tag: TypeTag) -> Option<UntypedRef> {
        self.type_index
            .get(&tag)
            .and_then(|ix| ix.first())
            .map(|&i| self.components[i])
    }

    /// All attached components of the given tag, in insertion order.
    pub fn all_of(&self, tag: TypeTag) -> impl Iterator<Item = UntypedRef> + '_ {
        self.type_index
            .get(&tag)
            .into_iter()
            .flatten()
            .map(|&i| self.components[i])
    }

    pub(crate) fn attach(&mut self, handle: UntypedRef) {
        let tag = handle.type_tag();
        let pos = self.components.len();
        self.components.push(handle);
        self.type_index.entry(tag).or_default().push(pos);
        self.type_bits.add(tag.index());
        if let Some(bit) = tag.bit() {
            self.fast_bits |= bit;
        }
    }

    pub(crate) fn detach(&mut self, handle: &UntypedRef) -> bool {
        let Some(pos) = self.components.iter().position(|h| h == handle) else {
            return false;
        };
        self.components.remove(pos);

        // Every index past the removed position shifts down by one.
        let tag = handle.type_tag();
        for indices in self.type_index.values_mut() {
            indices.retain(|&i| i != pos);
            for i in indices.iter_mut() {
                if *i > pos {
                    *i -= 1;
                }
            }
        }
        let last_of_tag = self
            .type_index
            .get(&tag)
            .map_or(true, |indices| indices.is_empty());
        if last_of_tag {
            self.type_index.remove(&tag);
            self.type_bits.remove(tag.index());
            if let Some(bit) = tag.bit() {
                self.fast_bits &= !bit;
            }
        }
        true
    }
}

/// The global entity table: a monotonic id allocator plus the mapping
/// from live ids to their graphs.
#[derive(Debug)]
pub(crate) struct EntityRegistry {
    next_id: u64,
    entities: AHashMap<u64, EntityGraph>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        // Id 0 is reserved as the null id.
        EntityRegistry {
            next_id: 1,
            entities: AHashMap::new(),
        }
    }
}

impl EntityRegistry {
    pub fn create(&mut self, mask: u64) -> Entity {
        let entity = Entity::new(self.next_id);
        self.next_id += 1;
        self.entities.insert(entity.id(), EntityGraph::new(mask));
        entity
    }

    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains_key(&entity.id())
    }

    pub fn graph_of(&self, entity: Entity) -> Option<&EntityGraph> {
        self.entities.get(&entity.id())
    }

    pub fn graph_mut(&mut self, entity: Entity) -> Option<&mut EntityGraph> {
        self.entities.get_mut(&entity.id())
    }

    pub fn remove(&mut self, entity: Entity) -> Option<EntityGraph> {
        self.entities.remove(&entity.id())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.keys().map(|&id| Entity::new(id))
    }
}
