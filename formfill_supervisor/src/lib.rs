//! formfill_supervisor
//!
//! Outside-world facing orchestration layer for `formfill_core`.
//!
//! Responsibilities:
//! - own per-session `MappingSession` state
//! - shard sessions by id (deterministic)
//! - convert extraction/detection records into core types via adapters
//! - drive the mapping state machine and the confirmation gate
//!
//! Non-goals:
//! - no IO
//! - no async
//! - no mapping policy (lives in core)

pub mod adapter;
pub mod session;
pub mod supervisor;

pub use adapter::{
    build_entity_batch, field_from_slot, fields_from_slots, BasicEntityBuilder, DetectedSlot, EntityBuilder,
    ExtractionRecord, FormRenderer, RenderError, ReportedOutcome,
};

pub use session::{
    BlockReason, Choice, ConfirmOutcome, FinalizeOutcome, MappingSession, SessionError, SessionId, SessionState,
    SessionView,
};

pub use supervisor::{RestoreStats, SessionRequest, SessionSupervisor, SupervisorSnapshot};
