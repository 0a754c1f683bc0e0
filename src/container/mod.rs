//! Container management module for the host agent
//!
//! Owns the two in-memory registries of an agent:
//! - the unit registry (unit name -> container), see [`UnitManager`]
//! - the session registry (session id -> attached shell), see [`SessionManager`]
//!
//! Each registry has its own lock; neither is held across runtime or stream I/O.

mod error;
mod manager;
mod reaper;
pub mod session;

pub use error::ContainerError;
pub use manager::{Unit, UnitHandle, UnitManager};
pub use reaper::spawn_reaper;
pub use session::{Session, SessionHandle, SessionManager};
