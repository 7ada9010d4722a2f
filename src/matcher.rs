//! Composition predicates over an entity's component-type set and
//! classification mask.

use std::any::TypeId;

use crate::{
    storage::{ComponentStores, TypeTag},
    world::{Component, EntityGraph},
};

/// A reference to a component type inside a matcher, recorded before
/// the matcher has met a world. The `ensure` hook registers the type
/// (assigning its tag) when the matcher is compiled.
#[derive(Clone, Copy)]
struct TypeTerm {
    tid: TypeId,
    ensure: fn(&mut ComponentStores) -> TypeTag,
}

impl std::fmt::Debug for TypeTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TypeTerm").field(&self.tid).finish()
    }
}

/// An immutable predicate over entity composition.
///
/// Built by value, builder style; attached to a world by
/// [`World::create_collector`](crate::world::World::create_collector)
/// or evaluated ad hoc with
/// [`World::matches`](crate::world::World::matches).
///
/// Semantics, in evaluation order:
/// 1. a non-zero `entity_mask` must share a bit with the entity mask,
/// 2. a componentless entity only matches with `allow_empty`,
/// 3. none of the `of_none` types may be present,
/// 4. at least one `of_any` type must be present (if any were named),
/// 5. all `of_all` types must be present.
///
/// ## Examples
///
/// ```
/// use tickecs::prelude::*;
///
/// #[derive(Default)]
/// struct Position;
/// impl Component for Position {}
/// #[derive(Default)]
/// struct Frozen;
/// impl Component for Frozen {}
///
/// let movable = EntityMatcher::new()
///     .of_all::<Position>()
///     .of_none::<Frozen>();
/// # let _ = movable;
/// ```
#[derive(Clone, Debug, Default)]
pub struct EntityMatcher {
    all: Vec<TypeTerm>,
    any: Vec<TypeTerm>,
    none: Vec<TypeTerm>,
    entity_mask: u64,
    allow_empty: bool,
}

impl EntityMatcher {
    /// Creates a matcher that accepts every entity owning at least one
    /// component.
    pub fn new() -> Self {
        Self::default()
    }

    fn term<T: Component>() -> TypeTerm {
        TypeTerm {
            tid: TypeId::of::<T>(),
            ensure: ComponentStores::ensure::<T>,
        }
    }

    /// Requires the entity mask to share at least one bit with `mask`.
    /// Zero (the default) disables the mask test.
    pub fn with_mask(mut self, mask: u64) -> Self {
        self.entity_mask = mask;
        self
    }

    /// Requires a component of type `T` to be present.
    pub fn of_all<T: Component>(mut self) -> Self {
        self.all.push(Self::term::<T>());
        self
    }

    /// Requires at least one of the `of_any` types to be present.
    pub fn of_any<T: Component>(mut self) -> Self {
        self.any.push(Self::term::<T>());
        self
    }

    /// Rejects entities owning a component of type `T`.
    pub fn of_none<T: Component>(mut self) -> Self {
        self.none.push(Self::term::<T>());
        self
    }

    /// Accepts entities that own no components at all (they are
    /// rejected by default).
    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    /// Resolves the recorded type terms against a world's store
    /// registry, registering types on first sight.
    pub(crate) fn compile(&self, stores: &mut ComponentStores) -> CompiledMatcher {
        fn resolve(terms: &[TypeTerm], stores: &mut ComponentStores) -> Vec<TypeTag> {
            let mut tags: Vec<TypeTag> = terms.iter().map(|t| (t.ensure)(stores)).collect();
            tags.sort_unstable();
            tags.dedup();
            tags
        }

        let all = resolve(&self.all, stores);
        let any = resolve(&self.any, stores);
        let none = resolve(&self.none, stores);
        CompiledMatcher::new(all, any, none, self.entity_mask, self.allow_empty)
    }
}

/// A matcher with its type terms resolved to tags and its fast masks
/// precomputed.
#[derive(Clone, Debug)]
pub(crate) struct CompiledMatcher {
    all: Vec<TypeTag>,
    any: Vec<TypeTag>,
    none: Vec<TypeTag>,
    all_fast: u64,
    any_fast: u64,
    none_fast: u64,
    wide: bool,
    entity_mask: u64,
    allow_empty: bool,
}

impl CompiledMatcher {
    fn new(
        all: Vec<TypeTag>,
        any: Vec<TypeTag>,
        none: Vec<TypeTag>,
        entity_mask: u64,
        allow_empty: bool,
    ) -> Self {
        fn fast_mask(tags: &[TypeTag]) -> Option<u64> {
            tags.iter().try_fold(0u64, |acc, tag| Some(acc | tag.bit()?))
        }

        let masks = (fast_mask(&all), fast_mask(&any), fast_mask(&none));
        match masks {
            (Some(all_fast), Some(any_fast), Some(none_fast)) => CompiledMatcher {
                all,
                any,
                none,
                all_fast,
                any_fast,
                none_fast,
                wide: false,
                entity_mask,
                allow_empty,
            },
            // Some tag fell outside the 64-bit budget; evaluate through
            // the full presence bitset instead.
            _ => CompiledMatcher {
                all,
                any,
                none,
                all_fast: 0,
                any_fast: 0,
                none_fast: 0,
                wide: true,
                entity_mask,
                allow_empty,
            },
        }
    }

    pub fn matches(&self, graph: &EntityGraph) -> bool {
        if self.entity_mask != 0 && graph.mask() & self.entity_mask == 0 {
            return false;
        }
        if graph.is_componentless() && !self.allow_empty {
            return false;
        }
        if self.wide {
            self.matches_wide(graph)
        } else {
            let bits = graph.fast_bits();
            bits & self.none_fast == 0
                && (self.any_fast == 0 || bits & self.any_fast != 0)
                && bits & self.all_fast == self.all_fast
        }
    }

    fn matches_wide(&self, graph: &EntityGraph) -> bool {
        if self.none.iter().any(|&tag| graph.contains_tag(tag)) {
            return false;
        }
        if !self.any.is_empty() && !self.any.iter().any(|&tag| graph.contains_tag(tag)) {
            return false;
        }
        self.all.iter().all(|&tag| graph.contains_tag(tag))
    }
}
