use crate::world::Entity;

/// Plain data owned by an entity.
///
/// Components are zero-initialized through `Default` when created, and
/// get lifecycle hooks when their slot is populated and vacated. The
/// hooks receive the owning entity id; they deliberately do not receive
/// world access, so they cannot re-enter a mutation that is already in
/// flight.
///
/// ## Examples
///
/// ```
/// use tickecs::prelude::*;
///
/// #[derive(Default)]
/// pub struct Position {
///     pub x: f32,
///     pub y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: Default + Sized + 'static {
    /// Called right after the component's slot is populated.
    fn on_create(&mut self, _entity: Entity) {}

    /// Called right before the component's slot is vacated.
    ///
    /// When an entity is destroyed its components are destroyed in
    /// reverse insertion order, so a later component may still refer to
    /// an earlier one while this hook runs.
    fn on_destroy(&mut self, _entity: Entity) {}
}
