#![warn(missing_docs)]

//! # tickecs
//!
//! A lightweight Entity-Component-System toolkit for tick-based,
//! single-threaded simulations. It is meant to coexist with larger
//! engines rather than replace them: embeddable, allocation-aware, and
//! free of hidden threading.
//!
//! The core pieces:
//!
//! - [`World`](world::World): the composition root (entity table,
//!   component stores, systems, managers, and the tick loop).
//! - [`ComponentRef`](storage::ComponentRef) /
//!   [`UntypedRef`](storage::UntypedRef): stable `(tag, offset,
//!   version)` handles that survive slot reuse and observably fail
//!   once cut.
//! - [`EntityMatcher`](matcher::EntityMatcher): a predicate over an
//!   entity's component composition and classification mask.
//! - [`Collector`](collector::Collector): a live, change-tracked view
//!   of the entities satisfying a matcher.
//! - [`ModifyQueue`](modify::ModifyQueue): deferred commands with an
//!   immediate lane and cooperative re-entrancy guards.
//!
//! Everything runs on the thread that owns the `World`. Concurrency is
//! strictly re-entrancy through callbacks; there are no locks and no
//! suspension points.
//!
//! ## Example
//!
//! ```
//! use tickecs::prelude::*;
//!
//! #[derive(Default)]
//! struct Position {
//!     x: i32,
//!     y: i32,
//! }
//! impl Component for Position {}
//!
//! let mut world = World::new();
//! world.startup()?;
//!
//! let hero = world.create_entity()?;
//! let pos = world.create_component::<Position>(hero)?;
//! pos.write(&mut world)?.x = 3;
//! assert_eq!(pos.read(&world)?.x, 3);
//!
//! world.destroy_entity(hero)?;
//! assert!(!pos.live(&world));
//! # Ok::<(), tickecs::error::EcsError>(())
//! ```

pub mod collector;
pub mod error;
pub mod matcher;
pub mod modify;
pub mod prelude;
pub mod signal;
pub mod storage;
pub mod system;
pub mod world;

pub use crate::{
    collector::{Collector, EntityCollectorFlag},
    error::EcsError,
    matcher::EntityMatcher,
    modify::{ModifyQueue, RaiseOptions, Schedule},
    signal::{Signal, SignalDisposal},
    storage::{ComponentRef, TypeTag, UntypedRef},
    system::{Manager, System},
    world::{Component, Entity, EntityHandle, QueueKey, World, WorldPhase},
};
