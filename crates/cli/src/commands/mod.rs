//! Command implementations

pub mod deployments;
pub mod extensions;
pub mod pods;
