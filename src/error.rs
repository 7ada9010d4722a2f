//! The crate-wide error type.
//!
//! Every fallible operation in this library returns [`EcsError`]. The
//! variants map one-to-one onto the ways a caller can misuse the world:
//! touching dead entities, dereferencing cut handles, violating the
//! lifecycle phase machine, or breaking the modify-queue scheduling
//! rules.

use thiserror::Error;

use crate::world::{Entity, WorldPhase};

/// The error type for all fallible `tickecs` operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// The operation referenced an entity that was destroyed or never
    /// allocated in this world.
    #[error("entity {0:?} is not alive")]
    EntityInvalid(Entity),

    /// The handle's slot version no longer matches: the component it
    /// pointed at has been destroyed (and its slot possibly reused).
    #[error("component handle is cut; the slot version has moved on")]
    RefCut,

    /// An untyped handle was narrowed to a component type it does not
    /// refer to.
    #[error("handle does not refer to the requested component type")]
    TypeMismatch,

    /// An untyped operation named a component type that was never
    /// registered with this world.
    #[error("component type is not registered with this world")]
    UnregisteredType,

    /// The operation is not legal in the world's current phase.
    #[error("operation is not legal in the {0:?} phase")]
    LifecyclePhase(WorldPhase),

    /// A command tried to schedule onto the modify queue while another
    /// command was executing, without passing `ignore_loop`.
    #[error("modify queue is executing a command; pass ignore_loop to schedule anyway")]
    LoopGuard,

    /// An immediate command was scheduled outside an active raise of
    /// the matching key.
    #[error("immediate commands are only legal during a raise of the same key")]
    ImmediateNotPermitted,

    /// `raise` was called for a key that is already on the raise stack.
    #[error("key is already being raised")]
    Reentry,

    /// The same receiver was connected twice to a signal that does not
    /// allow duplication.
    #[error("receiver is already connected to this signal")]
    DuplicateSubscription,
}
