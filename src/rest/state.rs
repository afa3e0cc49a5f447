use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::assignment::{AssignmentState, StateStore};
use crate::config::RestConfig;
use crate::error::Result;
use crate::rest::client::RestClient;

const STATE_TABLE: &str = "assignment_state";

#[derive(Debug, Serialize, Deserialize)]
struct CursorRow {
    program: String,
    cursor: usize,
}

/// Cursor map kept in the hosted `assignment_state` table so every instance
/// of the service shares it.
#[derive(Debug, Clone)]
pub struct RestStateStore {
    client: RestClient,
}

impl RestStateStore {
    pub fn new(config: &RestConfig) -> Result<Self> {
        Ok(Self {
            client: RestClient::new(config)?,
        })
    }
}

#[async_trait]
impl StateStore for RestStateStore {
    async fn load_state(&self) -> Result<Option<AssignmentState>> {
        let rows: Vec<CursorRow> = self
            .client
            .select_all(STATE_TABLE, &[("select", "program,cursor"), ("order", "program.asc")])
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        let mut state = AssignmentState::default();
        for row in rows {
            state.set_cursor(row.program, row.cursor);
        }
        Ok(Some(state))
    }

    async fn save_state(&self, state: &AssignmentState) -> Result<()> {
        let rows: Vec<CursorRow> = state
            .iter()
            .map(|(program, cursor)| CursorRow {
                program: program.to_string(),
                cursor,
            })
            .collect();
        self.client.upsert(STATE_TABLE, &rows, "program").await
    }
}
