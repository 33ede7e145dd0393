/*!
 * OS Module
 * Compute-node resource scheduling layered on the process manager
 */

pub mod resource;
pub mod system;

pub use resource::Resource;
pub use system::{NodeConfig, System};
