pub mod lead;
pub mod store;

pub use lead::{Lead, LeadApplication, LeadAssignment, LeadStatus, LeadUpdate};
pub use store::{InMemoryLeadStore, LeadStore};
