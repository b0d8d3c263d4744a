//! Request approval workflow
//!
//! - Static per-kind configuration (field schema, approval policy)
//! - Action buttons and the tokens they round-trip through the transport
//! - The engine driving the request state machine

pub mod actions;
pub mod engine;
pub mod kind;

pub use actions::{ActionKind, ActionToken, Button, Keyboard, TokenError, MAX_TOKEN_LEN};
pub use engine::{RequestEngine, Transition};
pub use kind::{KindProfile, RequestKind};
