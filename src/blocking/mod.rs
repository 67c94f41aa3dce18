//! Enforcement of usage limits.
//!
//! [registry::BlockRegistry] holds what is blocked and until when. [policy::BlockPolicy] writes
//! into it whenever an app goes over its limit, and [enforcer::Enforcer] reads it on a timer and
//! closes matching processes.

pub mod enforcer;
pub mod policy;
pub mod process_table;
pub mod registry;
