//! Per-program lead assignment.
//!
//! - [`AssignmentAllocator`]: picks the team member for each new lead
//! - [`AssignmentState`] / [`StateStore`]: the persisted round-robin cursors
//! - [`LeadWorkloadSnapshot`]: leads per member, used to skip overloaded members

pub mod allocator;
pub mod state;
pub mod workload;

pub use allocator::{Allocation, AssignmentAllocator};
pub use state::{AssignmentState, FileStateStore, MemoryStateStore, StateStore};
pub use workload::{AssignmentStats, LeadWorkloadSnapshot};
