//! Supervisor lifecycle state (spec §4.E "Supervision state machine"),
//! modeled on `fc-router::mediator::CircuitBreaker`'s `RwLock<State>` shape.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Initializing,
    Ready,
    Stopping,
}

impl PluginState {
    pub fn is_ready(self) -> bool {
        matches!(self, PluginState::Ready)
    }
}
