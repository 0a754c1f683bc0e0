//! API request handlers

pub mod forward;
pub mod health;
pub mod shell;
pub mod vms;
