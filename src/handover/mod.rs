//! Duty handover (HOTO)
//!
//! - Per-chat session state shared by every participant
//! - The coordinator driving the handshake
//! - Roster queries over the persisted log

pub mod coordinator;
pub mod roster;
pub mod session;

pub use coordinator::{HandoverCoordinator, HandoverOutcome};
pub use roster::{DutyHolder, Roster, RosterService};
pub use session::{HotoSession, SessionStore};
