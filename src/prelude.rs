//! Prelude module
//!
//! Contains the most common types and traits you will need when
//! working with this crate.

pub use crate::{
    collector::{Collector, EntityCollectorFlag},
    error::EcsError,
    matcher::EntityMatcher,
    modify::{ModifyQueue, RaiseOptions, Schedule},
    signal::{Signal, SignalDisposal, SignalReceiver},
    storage::{AnyStore, ComponentRef, ComponentStore, TypeTag, UntypedRef},
    system::{Manager, System},
    world::{
        Component, Entity, EntityGraph, EntityHandle, QueueKey, World, WorldPhase, WorldSignals,
    },
};
