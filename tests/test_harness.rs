//! Shared fakes for the integration tests.
//!
//! - [`ScriptedLeadStore`]: a lead store whose workload, latency and failures
//!   are set by the test
//! - [`FailingStateStore`]: a state store whose saves always fail

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use admissions_lite::assignment::{AssignmentAllocator, AssignmentState, MemoryStateStore, StateStore};
use admissions_lite::config::AllocatorConfig;
use admissions_lite::error::{AdmissionsError, Result};
use admissions_lite::leads::{Lead, LeadAssignment, LeadStatus, LeadStore, LeadUpdate};
use uuid::Uuid;

pub fn abc_config() -> AllocatorConfig {
    AllocatorConfig::new(["A", "B", "C"], ["X", "Y"])
}

/// `count` leads assigned to `member` in program `program`.
pub fn rows(member: &str, program: &str, count: usize) -> Vec<LeadAssignment> {
    (0..count)
        .map(|_| LeadAssignment {
            assignee: Some(member.to_string()),
            program: Some(program.to_string()),
        })
        .collect()
}

/// Lead store driven entirely by the test.
#[derive(Default)]
pub struct ScriptedLeadStore {
    assignments: RwLock<Vec<LeadAssignment>>,
    inserted: RwLock<Vec<Lead>>,
    fail_queries: AtomicBool,
    fail_inserts: AtomicBool,
    query_delay_ms: AtomicU64,
    insert_delay_ms: AtomicU64,
    lookup_delay_ms: AtomicU64,
    queries: AtomicUsize,
    lookups: AtomicUsize,
}

impl ScriptedLeadStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_assignments(assignments: Vec<LeadAssignment>) -> Arc<Self> {
        Arc::new(Self {
            assignments: RwLock::new(assignments),
            ..Default::default()
        })
    }

    pub async fn set_assignments(&self, assignments: Vec<LeadAssignment>) {
        *self.assignments.write().await = assignments;
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn delay_queries(&self, delay: Duration) {
        self.query_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn delay_inserts(&self, delay: Duration) {
        self.insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn delay_lookups(&self, delay: Duration) {
        self.lookup_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of duplicate phone lookups served.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub async fn inserted(&self) -> Vec<Lead> {
        self.inserted.read().await.clone()
    }
}

#[async_trait]
impl LeadStore for ScriptedLeadStore {
    async fn query_lead_assignments(&self) -> Result<Vec<LeadAssignment>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let delay = self.query_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AdmissionsError::LeadStore("store unreachable".to_string()));
        }
        Ok(self.assignments.read().await.clone())
    }

    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(AdmissionsError::LeadStore("insert rejected".to_string()));
        }
        self.inserted.write().await.push(lead.clone());
        self.assignments.write().await.push(LeadAssignment::from(lead));
        Ok(())
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<Uuid>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AdmissionsError::LeadStore("store unreachable".to_string()));
        }
        Ok(self
            .inserted
            .read()
            .await
            .iter()
            .find(|lead| lead.phone == phone)
            .map(|lead| lead.id))
    }

    async fn list_leads(&self, status: Option<LeadStatus>) -> Result<Vec<Lead>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(AdmissionsError::LeadStore("store unreachable".to_string()));
        }
        Ok(self
            .inserted
            .read()
            .await
            .iter()
            .rev()
            .filter(|lead| status.map_or(true, |s| lead.status == s))
            .cloned()
            .collect())
    }

    async fn get_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self
            .inserted
            .read()
            .await
            .iter()
            .find(|lead| lead.id == id)
            .cloned())
    }

    async fn update_lead(&self, id: Uuid, update: &LeadUpdate) -> Result<Option<Lead>> {
        let mut inserted = self.inserted.write().await;
        Ok(inserted.iter_mut().find(|lead| lead.id == id).map(|lead| {
            update.apply_to(lead);
            lead.clone()
        }))
    }
}

/// State store that loads `initial` but refuses every save.
#[derive(Default)]
pub struct FailingStateStore {
    pub initial: Option<AssignmentState>,
    pub save_attempts: AtomicUsize,
}

#[async_trait]
impl StateStore for FailingStateStore {
    async fn load_state(&self) -> Result<Option<AssignmentState>> {
        Ok(self.initial.clone())
    }

    async fn save_state(&self, _state: &AssignmentState) -> Result<()> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        Err(AdmissionsError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only volume",
        )))
    }
}

/// Allocator over an in-memory state store and the given lead store.
pub fn allocator(
    config: AllocatorConfig,
    leads: Arc<ScriptedLeadStore>,
) -> (AssignmentAllocator, Arc<MemoryStateStore>) {
    let state = Arc::new(MemoryStateStore::new());
    let allocator = AssignmentAllocator::new(config, state.clone(), leads)
        .expect("test allocator config is valid");
    (allocator, state)
}
