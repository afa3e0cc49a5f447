use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdmissionsError {
    #[error("Invalid program: {program}. Must be one of: {valid}")]
    InvalidProgram { program: String, valid: String },

    #[error("Invalid application: {0}")]
    InvalidApplication(String),

    #[error("An application with this phone number already exists: {phone}")]
    DuplicateApplication { phone: String },

    #[error("Lead not found: {0}")]
    LeadNotFound(uuid::Uuid),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Workload lookup failed: {0}")]
    WorkloadLookupFailed(String),

    #[error("Failed to persist assignment state: {0}")]
    StatePersistenceFailed(String),

    #[error("Lead store error: {0}")]
    LeadStore(String),

    #[error("Timed out waiting for the lead store after {0}ms")]
    SubmissionTimeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl AdmissionsError {
    /// True for errors caused by the caller's input rather than a collaborator.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AdmissionsError::InvalidProgram { .. }
                | AdmissionsError::InvalidApplication(_)
                | AdmissionsError::DuplicateApplication { .. }
                | AdmissionsError::LeadNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AdmissionsError>;
