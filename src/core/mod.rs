/*!
 * Core Module
 * Shared types for the scheduling core
 */

pub mod types;

pub use types::{Pid, ResourceId, SimTime};
