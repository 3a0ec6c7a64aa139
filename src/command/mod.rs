//! Command dispatch for the rig
//!
//! This module handles:
//! - Mapping command codes to actuation routines
//! - Gating incoming codes (unknown, not ready, duplicate, in progress)
//! - Running one routine at a time against the rig

mod actions;
mod dispatcher;
pub mod handlers;

pub use actions::{ActionRoutine, ActionTable, RigHandles};
pub use dispatcher::{CommandDispatcher, RoutineSettled};
