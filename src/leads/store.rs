use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AdmissionsError, Result};
use crate::leads::lead::{Lead, LeadAssignment, LeadStatus, LeadUpdate};

const DEFAULT_MAX_LEADS: usize = 100_000;

/// The external lead table, as seen by the allocator, the intake flow and the
/// dashboard.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Current assignee (and program) of every lead.
    async fn query_lead_assignments(&self) -> Result<Vec<LeadAssignment>>;

    /// Id of a lead already registered under `phone`, if any.
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Uuid>>;

    /// Leads newest first, optionally restricted to one status.
    async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>>;

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>>;

    /// Persist a new lead.
    async fn insert_lead(&self, lead: &Lead) -> Result<()>;

    /// Apply `update` to a lead. Returns the edited lead, or `None` if no lead has `id`.
    async fn update_lead(&self, id: Uuid, update: &LeadUpdate) -> Result<Option<Lead>>;
}

/// Lead table held in process memory.
#[derive(Debug)]
pub struct InMemoryLeadStore {
    leads: RwLock<HashMap<Uuid, Lead>>,
    max_leads: usize,
}

impl Default for InMemoryLeadStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeadStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LEADS)
    }

    pub fn with_capacity(max_leads: usize) -> Self {
        Self {
            leads: RwLock::new(HashMap::new()),
            max_leads,
        }
    }
}

#[async_trait]
impl LeadStore for InMemoryLeadStore {
    async fn query_lead_assignments(&self) -> Result<Vec<LeadAssignment>> {
        Ok(self
            .leads
            .read()
            .await
            .values()
            .map(LeadAssignment::from)
            .collect())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Uuid>> {
        Ok(self
            .leads
            .read()
            .await
            .values()
            .find(|lead| lead.phone == phone)
            .map(|lead| lead.id))
    }

    async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .read()
            .await
            .values()
            .filter(|lead| status.map_or(true, |s| lead.status == s))
            .cloned()
            .collect();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self.leads.read().await.get(&id).cloned())
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        let mut leads = self.leads.write().await;
        if leads.len() >= self.max_leads && !leads.contains_key(&lead.id) {
            return Err(AdmissionsError::LeadStore(format!(
                "lead store is at capacity ({})",
                self.max_leads
            )));
        }
        leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn update_lead(&self, id: Uuid, update: &LeadUpdate) -> Result<Option<Lead>> {
        let mut leads = self.leads.write().await;
        Ok(leads.get_mut(&id).map(|lead| {
            update.apply_to(lead);
            lead.clone()
        }))
    }
}
