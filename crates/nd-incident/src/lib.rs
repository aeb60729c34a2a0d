//! Per-object incident state machine (spec §4.G, the `Incident` half of
//! the event router): one actor per object behind the registry's mutex,
//! severity lifecycle, rule/escalation memoization, and the deferred
//! re-evaluation timer. Grounded on `fc-router::manager`'s per-key
//! `DashMap`-keyed actor shape.

pub mod machine;
pub mod registry;
pub mod timer;

pub use machine::{EventOutcome, HistoryNote, IncidentActor};
pub use registry::IncidentRegistry;
pub use timer::{earliest, IncidentTimer};
