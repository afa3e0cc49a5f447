use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::assignment::AssignmentAllocator;
use crate::config::IntakeConfig;
use crate::error::{AdmissionsError, Result};
use crate::leads::{Lead, LeadApplication, LeadStatus, LeadStore, LeadUpdate};

/// Turns form submissions into assigned leads and applies dashboard edits.
pub struct LeadIntake {
    allocator: Arc<AssignmentAllocator>,
    leads: Arc<dyn LeadStore>,
    config: IntakeConfig,
}

impl LeadIntake {
    pub fn new(
        allocator: Arc<AssignmentAllocator>,
        leads: Arc<dyn LeadStore>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            allocator,
            leads,
            config,
        }
    }

    /// Validate, assign and store one application.
    ///
    /// A phone number already on file is rejected before any assignee is
    /// chosen. A lead that fails to store has still consumed its round-robin
    /// turn.
    pub async fn submit(&self, application: LeadApplication) -> Result<Lead> {
        application.validate()?;
        self.ensure_program(&application.program)?;
        self.reject_duplicate(&application.phone).await?;

        let allocation = self.allocator.allocate(&application.program).await?;
        let lead = Lead::from_application(application, Some(allocation.member));
        self.store(&lead).await?;

        tracing::info!(
            lead_id = %lead.id,
            program = %lead.program,
            assign_to = ?lead.assign_to,
            "Lead submitted"
        );
        Ok(lead)
    }

    /// Store a lead entered by staff, without an assignee and without
    /// touching any round-robin cursor.
    pub async fn add_lead(
        &self,
        application: LeadApplication,
        status: Option<LeadStatus>,
    ) -> Result<Lead> {
        application.validate()?;
        self.ensure_program(&application.program)?;

        let mut lead = Lead::from_application(application, None);
        if let Some(status) = status {
            lead.status = status;
        }
        self.store(&lead).await?;

        tracing::info!(lead_id = %lead.id, program = %lead.program, "Lead added");
        Ok(lead)
    }

    pub async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>> {
        self.bounded(self.leads.list_leads(status), self.config.submit_timeout_ms)
            .await
    }

    pub async fn get_lead(&self, id: Uuid) -> Result<Lead> {
        self.bounded(self.leads.get_lead(id), self.config.submit_timeout_ms)
            .await?
            .ok_or(AdmissionsError::LeadNotFound(id))
    }

    /// Edit a stored lead.
    ///
    /// Programs must be configured ones and a new assignee must be on the
    /// roster. Reassigning by hand does not move any cursor.
    pub async fn update_lead(&self, id: Uuid, update: LeadUpdate) -> Result<Lead> {
        update.validate()?;
        if let Some(program) = &update.program {
            self.ensure_program(program)?;
        }
        if let Some(member) = &update.assign_to {
            if !self.allocator.current_roster().contains(member) {
                return Err(AdmissionsError::InvalidApplication(format!(
                    "not a team member: {member}"
                )));
            }
        }

        let lead = self
            .bounded(self.leads.update_lead(id, &update), self.config.submit_timeout_ms)
            .await?
            .ok_or(AdmissionsError::LeadNotFound(id))?;

        tracing::info!(lead_id = %id, status = %lead.status, "Lead updated");
        Ok(lead)
    }

    pub fn allocator(&self) -> &Arc<AssignmentAllocator> {
        &self.allocator
    }

    fn ensure_program(&self, program: &str) -> Result<()> {
        let programs = self.allocator.current_programs();
        if programs.iter().any(|p| p == program) {
            Ok(())
        } else {
            Err(AdmissionsError::InvalidProgram {
                program: program.to_string(),
                valid: programs.join(", "),
            })
        }
    }

    // A blank phone number identifies nobody, so it is never a duplicate.
    async fn reject_duplicate(&self, phone: &str) -> Result<()> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Ok(());
        }

        let existing = self
            .bounded(
                self.leads.find_by_phone(phone),
                self.config.duplicate_check_timeout_ms,
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Duplicate lead check failed");
                e
            })?;

        match existing {
            Some(lead_id) => {
                tracing::info!(lead_id = %lead_id, "Rejected duplicate application");
                Err(AdmissionsError::DuplicateApplication {
                    phone: phone.to_string(),
                })
            }
            None => Ok(()),
        }
    }

    async fn store(&self, lead: &Lead) -> Result<()> {
        self.bounded(self.leads.insert_lead(lead), self.config.submit_timeout_ms)
            .await
            .map_err(|e| {
                tracing::error!(lead_id = %lead.id, error = %e, "Failed to store lead");
                e
            })
    }

    /// Run a lead-store call under `timeout_ms`, folding every store failure
    /// into [`AdmissionsError::LeadStore`].
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T>>,
        timeout_ms: u64,
    ) -> Result<T> {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(AdmissionsError::LeadStore(msg))) => Err(AdmissionsError::LeadStore(msg)),
            Ok(Err(e)) => Err(AdmissionsError::LeadStore(e.to_string())),
            Err(_) => Err(AdmissionsError::SubmissionTimeout(timeout_ms)),
        }
    }
}
