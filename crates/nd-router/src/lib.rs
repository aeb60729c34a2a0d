//! Event ingest pipeline, incident escalation/routing evaluation, and the
//! post-commit notification dispatcher (spec §4.G-H). Ties together
//! `nd-object` (object identity/persistence), `nd-incident` (per-object
//! state machine), `nd-configstore` (the live rule/recipient graph),
//! `nd-filter` (the three evaluation contexts below), and `nd-plugin`
//! (channel delivery).

pub mod age_hint;
pub mod duration;
pub mod escalation_context;
pub mod object_context;
pub mod persistence;
pub mod pipeline;
pub mod recipients;
pub mod routing_context;

mod machine_notes;

pub use duration::parse_duration;
pub use escalation_context::EscalationFilterContext;
pub use object_context::ObjectFilterContext;
pub use pipeline::EventRouter;
pub use routing_context::RoutingFilterContext;
