use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::api::{run_api, ApiState};
use crate::assignment::{AssignmentAllocator, FileStateStore, MemoryStateStore, StateStore};
use crate::config::{AppConfig, LeadBackend, StateBackend};
use crate::error::Result;
use crate::intake::LeadIntake;
use crate::leads::{InMemoryLeadStore, LeadStore};
use crate::rest::{RestLeadStore, RestStateStore};

/// Wires the configured stores, the allocator and the intake flow together.
pub struct Server {
    pub config: AppConfig,
    pub allocator: Arc<AssignmentAllocator>,
    pub intake: Arc<LeadIntake>,
}

impl Server {
    /// Open the configured backends and restore the assignment cursors.
    ///
    /// # Errors
    ///
    /// Returns an error if the allocator configuration is invalid or a REST
    /// backend cannot be constructed. An unreadable cursor state is not an
    /// error; the allocator starts from zero.
    pub async fn build(config: AppConfig) -> Result<Self> {
        let leads = lead_store(&config.leads)?;
        let state = state_store(&config.state)?;

        let allocator = Arc::new(
            AssignmentAllocator::restore(config.allocator.clone(), state, leads.clone()).await?,
        );
        let intake = Arc::new(LeadIntake::new(
            allocator.clone(),
            leads,
            config.intake.clone(),
        ));

        tracing::info!(
            roster = allocator.current_roster().len(),
            programs = allocator.current_programs().len(),
            workload_aware = config.allocator.workload_aware,
            "Assignment allocator ready"
        );

        Ok(Self {
            config,
            allocator,
            intake,
        })
    }

    /// Serve the HTTP API until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let state = ApiState {
            allocator: self.allocator,
            intake: self.intake,
        };
        run_api(self.config.listen_addr, state, shutdown).await
    }
}

pub fn lead_store(backend: &LeadBackend) -> Result<Arc<dyn LeadStore>> {
    Ok(match backend {
        LeadBackend::Memory => Arc::new(InMemoryLeadStore::new()),
        LeadBackend::Rest(rest) => Arc::new(RestLeadStore::new(rest)?),
    })
}

pub fn state_store(backend: &StateBackend) -> Result<Arc<dyn StateStore>> {
    Ok(match backend {
        StateBackend::Memory => Arc::new(MemoryStateStore::new()),
        StateBackend::File(path) => Arc::new(FileStateStore::new(path)),
        StateBackend::Rest(rest) => Arc::new(RestStateStore::new(rest)?),
    })
}
