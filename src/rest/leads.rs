use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::RestConfig;
use crate::error::Result;
use crate::leads::{Lead, LeadAssignment, LeadStatus, LeadStore, LeadUpdate};
use crate::rest::client::RestClient;

const LEADS_TABLE: &str = "leads";
const ASSIGNMENT_COLUMNS: &str = "\"Assign To\",program";

#[derive(Debug, Deserialize)]
struct IdRow {
    id: Uuid,
}

/// The hosted `leads` table.
#[derive(Debug, Clone)]
pub struct RestLeadStore {
    client: RestClient,
}

impl RestLeadStore {
    pub fn new(config: &RestConfig) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
        })
    }
}

#[async_trait]
impl LeadStore for RestLeadStore {
    async fn query_lead_assignments(&self) -> Result<Vec<LeadAssignment>> {
        self.client
            .select_all(
                LEADS_TABLE,
                &[("select", ASSIGNMENT_COLUMNS), ("order", "id.asc")],
            )
            .await
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Uuid>> {
        let phone = format!("eq.{phone}");
        let rows: Vec<IdRow> = self
            .client
            .select(
                LEADS_TABLE,
                &[("select", "id"), ("phone", phone.as_str()), ("limit", "1")],
            )
            .await?;
        Ok(rows.into_iter().next().map(|row| row.id))
    }

    async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>> {
        let status = status.map(|s| format!("eq.{s}"));
        let mut query = vec![("select", "*"), ("order", "created_at.desc,id.asc")];
        if let Some(status) = &status {
            query.push(("status", status.as_str()));
        }
        self.client.select_all(LEADS_TABLE, &query).await
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let id = format!("eq.{id}");
        let rows: Vec<Lead> = self
            .client
            .select(
                LEADS_TABLE,
                &[("select", "*"), ("id", id.as_str()), ("limit", "1")],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        self.client.insert(LEADS_TABLE, std::slice::from_ref(lead)).await
    }

    async fn update_lead(&self, id: Uuid, update: &LeadUpdate) -> Result<Option<Lead>> {
        let id = format!("eq.{id}");
        let rows: Vec<Lead> = self
            .client
            .update(LEADS_TABLE, &[("id", id.as_str())], update)
            .await?;
        Ok(rows.into_iter().next())
    }
}
