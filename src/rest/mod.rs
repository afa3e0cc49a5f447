//! Adapters for the hosted backend's PostgREST interface.
//!
//! - [`RestLeadStore`]: the `leads` table
//! - [`RestStateStore`]: the `assignment_state` table, one row per program

pub mod client;
pub mod leads;
pub mod state;

pub use client::RestClient;
pub use leads::RestLeadStore;
pub use state::RestStateStore;
