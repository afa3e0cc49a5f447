use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{AdmissionsError, Result};

pub const DEFAULT_TEAM: [&str; 5] = [
    "Faizan Ullah",
    "Shahzaib Shams",
    "Aneeza Komal",
    "Alvina Sami",
    "Abubakr Mahmood",
];

pub const DEFAULT_PROGRAMS: [&str; 4] = [
    "Bar Transfer Course",
    "LLM Human Rights",
    "LLB (Hons)",
    "LLM Corporate",
];

/// Configuration for the per-program round-robin allocator.
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// Team members in round-robin order.
    pub roster: Vec<String>,
    /// Programs that accept allocations. Each gets its own cursor.
    pub programs: Vec<String>,
    /// Skip overloaded members in favour of the least-loaded one.
    /// When false the allocator is pure round-robin.
    pub workload_aware: bool,
    /// A candidate is skipped once its load exceeds the minimum by more than this.
    pub rebalance_threshold: u64,
    /// Upper bound on the workload query before falling back to round-robin.
    pub workload_timeout_ms: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            roster: DEFAULT_TEAM.iter().map(|m| m.to_string()).collect(),
            programs: DEFAULT_PROGRAMS.iter().map(|p| p.to_string()).collect(),
            workload_aware: true,
            rebalance_threshold: 2,
            workload_timeout_ms: 3000,
        }
    }
}

impl AllocatorConfig {
    pub fn new<R, P>(roster: R, programs: P) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            roster: roster.into_iter().map(Into::into).collect(),
            programs: programs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_workload_aware(mut self, enabled: bool) -> Self {
        self.workload_aware = enabled;
        self
    }

    pub fn with_rebalance_threshold(mut self, threshold: u64) -> Self {
        self.rebalance_threshold = threshold;
        self
    }

    pub fn with_workload_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.workload_timeout_ms = timeout_ms;
        self
    }

    /// Reject rosters and program sets the allocator cannot cycle over.
    pub fn validate(&self) -> Result<()> {
        if self.roster.is_empty() {
            return Err(AdmissionsError::InvalidConfig(
                "team roster must not be empty".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&self.roster) {
            return Err(AdmissionsError::InvalidConfig(format!(
                "duplicate team member: {dup}"
            )));
        }
        if self.programs.is_empty() {
            return Err(AdmissionsError::InvalidConfig(
                "program set must not be empty".to_string(),
            ));
        }
        if let Some(dup) = first_duplicate(&self.programs) {
            return Err(AdmissionsError::InvalidConfig(format!(
                "duplicate program: {dup}"
            )));
        }
        Ok(())
    }
}

fn first_duplicate(items: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .find(|item| !seen.insert(item.as_str()))
        .map(String::as_str)
}

/// Connection settings for the hosted backend's REST interface.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL of the project, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Anonymous or service key, sent as `apikey` and bearer token.
    pub api_key: String,
    pub request_timeout_ms: u64,
    /// Rows requested per page when reading whole tables.
    pub page_size: usize,
}

impl RestConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            request_timeout_ms: 5000,
            page_size: 1000,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// Where leads are read from and written to.
#[derive(Debug, Clone, Default)]
pub enum LeadBackend {
    #[default]
    Memory,
    Rest(RestConfig),
}

/// Where the per-program cursors are persisted.
#[derive(Debug, Clone, Default)]
pub enum StateBackend {
    #[default]
    Memory,
    File(PathBuf),
    Rest(RestConfig),
}

#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Upper bound on writing a submitted lead to the store.
    pub submit_timeout_ms: u64,
    /// Upper bound on the duplicate phone lookup that precedes assignment.
    pub duplicate_check_timeout_ms: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: 8000,
            duplicate_check_timeout_ms: 5000,
        }
    }
}

impl IntakeConfig {
    pub fn with_submit_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.submit_timeout_ms = timeout_ms;
        self
    }

    pub fn with_duplicate_check_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.duplicate_check_timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub allocator: AllocatorConfig,
    pub intake: IntakeConfig,
    pub leads: LeadBackend,
    pub state: StateBackend,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:8080"
                .parse()
                .expect("default listen address is valid"),
            allocator: AllocatorConfig::default(),
            intake: IntakeConfig::default(),
            leads: LeadBackend::default(),
            state: StateBackend::default(),
        }
    }
}

impl AppConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_allocator(mut self, allocator: AllocatorConfig) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_leads(mut self, leads: LeadBackend) -> Self {
        self.leads = leads;
        self
    }

    pub fn with_state(mut self, state: StateBackend) -> Self {
        self.state = state;
        self
    }
}
