use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AdmissionsError, Result};

/// Pipeline status of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    #[serde(rename = "No Contact")]
    NoContact,
    Interested,
    Thinking,
    #[serde(rename = "Next Session")]
    NextSession,
    #[serde(rename = "Not Affordable")]
    NotAffordable,
    #[serde(rename = "Not Interested")]
    NotInterested,
    Won,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 7] = [
        LeadStatus::NoContact,
        LeadStatus::Interested,
        LeadStatus::Thinking,
        LeadStatus::NextSession,
        LeadStatus::NotAffordable,
        LeadStatus::NotInterested,
        LeadStatus::Won,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::NoContact => "No Contact",
            LeadStatus::Interested => "Interested",
            LeadStatus::Thinking => "Thinking",
            LeadStatus::NextSession => "Next Session",
            LeadStatus::NotAffordable => "Not Affordable",
            LeadStatus::NotInterested => "Not Interested",
            LeadStatus::Won => "Won",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeadStatus {
    type Err = AdmissionsError;

    fn from_str(s: &str) -> Result<Self> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AdmissionsError::InvalidApplication(format!("unknown status: {s}")))
    }
}

/// Applicant data as collected by the public form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadApplication {
    pub name: String,
    pub dob: String,
    pub phone: String,
    pub education: String,
    pub email: String,
    pub source: String,
    pub program: String,
}

impl LeadApplication {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().chars().count() < 2 {
            return Err(AdmissionsError::InvalidApplication(
                "name must be at least 2 characters".to_string(),
            ));
        }
        if !is_valid_email(&self.email) {
            return Err(AdmissionsError::InvalidApplication(format!(
                "invalid email address: {}",
                self.email
            )));
        }
        if self.program.trim().is_empty() {
            return Err(AdmissionsError::InvalidApplication(
                "program is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || email.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// A row of the `leads` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub dob: String,
    pub phone: String,
    pub education: String,
    pub email: String,
    pub source: String,
    pub program: String,
    pub status: LeadStatus,
    #[serde(rename = "Assign To", default)]
    pub assign_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<String>,
}

impl Lead {
    /// A fresh lead from a form submission, in `No Contact` status.
    pub fn from_application(application: LeadApplication, assign_to: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            name: application.name,
            dob: application.dob,
            phone: application.phone,
            education: application.education,
            email: application.email,
            source: application.source,
            program: application.program,
            status: LeadStatus::NoContact,
            assign_to,
            follow_up_date: None,
            communication: None,
            pulse: None,
        }
    }
}

/// Partial edit of a lead, as made from the dashboard. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub education: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
    #[serde(
        rename = "Assign To",
        alias = "assign_to",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub assign_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse: Option<String>,
}

impl LeadUpdate {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the same field rules as the intake form to the fields present.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(AdmissionsError::InvalidApplication(
                "no fields to update".to_string(),
            ));
        }
        if let Some(name) = &self.name {
            if name.trim().chars().count() < 2 {
                return Err(AdmissionsError::InvalidApplication(
                    "name must be at least 2 characters".to_string(),
                ));
            }
        }
        if let Some(email) = &self.email {
            if !is_valid_email(email) {
                return Err(AdmissionsError::InvalidApplication(format!(
                    "invalid email address: {email}"
                )));
            }
        }
        Ok(())
    }

    pub fn apply_to(&self, lead: &mut Lead) {
        fn set(slot: &mut String, value: &Option<String>) {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }
        fn set_opt(slot: &mut Option<String>, value: &Option<String>) {
            if value.is_some() {
                slot.clone_from(value);
            }
        }

        set(&mut lead.name, &self.name);
        set(&mut lead.dob, &self.dob);
        set(&mut lead.phone, &self.phone);
        set(&mut lead.education, &self.education);
        set(&mut lead.email, &self.email);
        set(&mut lead.source, &self.source);
        set(&mut lead.program, &self.program);
        if let Some(status) = self.status {
            lead.status = status;
        }
        set_opt(&mut lead.assign_to, &self.assign_to);
        set_opt(&mut lead.follow_up_date, &self.follow_up_date);
        set_opt(&mut lead.communication, &self.communication);
        set_opt(&mut lead.pulse, &self.pulse);
    }
}

/// The slice of a lead the allocator needs to measure workload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAssignment {
    #[serde(rename = "Assign To", default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub program: Option<String>,
}

impl From<&Lead> for LeadAssignment {
    fn from(lead: &Lead) -> Self {
        Self {
            assignee: lead.assign_to.clone(),
            program: Some(lead.program.clone()),
        }
    }
}
