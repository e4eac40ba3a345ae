//! Core domain types for OnLeads leads and email drafts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The CRM-assigned numeric lead identifier (the `ID` column operators type
/// into `draft <lead_id>`). Immutable once assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub u64);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LeadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// Opaque handle of a record inside the CRM (a Notion page id, or a UUID in
/// the local backend). Relations between leads and emails are expressed with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Lead contact status.
///
/// `New < Contacted < Replied`. Any other CRM value (Won, Lost, ...) is kept
/// verbatim as `Other` and ranks past all of them: it belongs to a process
/// outside this crate and is never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContactStatus {
    New,
    Contacted,
    Replied,
    Other(String),
}

impl ContactStatus {
    /// External select value in the CRM.
    pub fn as_str(&self) -> &str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::Replied => "Replied",
            Self::Other(name) => name,
        }
    }

    /// Parse one of the managed statuses. Matching ignores case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(Self::New),
            "contacted" => Some(Self::Contacted),
            "replied" => Some(Self::Replied),
            _ => None,
        }
    }

    /// Read any CRM select value; unmanaged values become `Other`.
    pub fn from_crm(s: &str) -> Self {
        Self::parse(s).unwrap_or_else(|| Self::Other(s.trim().to_string()))
    }

    fn rank(&self) -> u8 {
        match self {
            Self::New => 0,
            Self::Contacted => 1,
            Self::Replied => 2,
            Self::Other(_) => 3,
        }
    }

    /// Returns the target status if moving there is a forward step, `None`
    /// if it would keep or regress the current status.
    pub fn advance_to(&self, target: ContactStatus) -> Option<ContactStatus> {
        (target.rank() > self.rank()).then_some(target)
    }
}

impl From<String> for ContactStatus {
    fn from(s: String) -> Self {
        Self::from_crm(&s)
    }
}

impl From<ContactStatus> for String {
    fn from(status: ContactStatus) -> Self {
        match status {
            ContactStatus::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ContactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery state of an email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailStatus {
    Draft,
    Sent,
}

impl EmailStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "to_be_sent",
            Self::Sent => "sent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "to_be_sent" | "draft" | "Draft" => Some(Self::Draft),
            "sent" | "Sent" => Some(Self::Sent),
            _ => None,
        }
    }
}

/// Classification of an email record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailType {
    FirstContact,
    FollowUp,
}

impl EmailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstContact => "first_contact",
            Self::FollowUp => "follow_up",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "first_contact" => Some(Self::FirstContact),
            "follow_up" => Some(Self::FollowUp),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Lead
// ---------------------------------------------------------------------------

/// A prospective contact record as stored in the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// CRM-assigned numeric identifier.
    pub id: LeadId,
    /// CRM record handle used in relations.
    pub record_id: RecordId,
    /// Display label.
    pub name: Option<String>,
    /// Free-text context (bio, role, description).
    pub profile: Option<String>,
    /// Normalized primary email address; the deduplication key.
    pub email_address: Option<String>,
    /// Provenance URL (stored in the CRM's `Linkedin` column).
    pub source_url: Option<String>,
    pub contact_status: ContactStatus,
    /// Related company records. Read and preserved, never written.
    #[serde(default)]
    pub company: Vec<RecordId>,
    /// Related email records, in link order.
    #[serde(default)]
    pub emails: Vec<RecordId>,
}

/// Input for creating a lead.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewLead {
    pub name: Option<String>,
    pub profile: Option<String>,
    pub email_address: Option<String>,
    pub source_url: Option<String>,
    /// Defaults to [`ContactStatus::New`] when `None`.
    pub contact_status: Option<ContactStatus>,
}

/// Partial update of a lead. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadUpdate {
    pub name: Option<String>,
    pub profile: Option<String>,
    pub source_url: Option<String>,
    pub contact_status: Option<ContactStatus>,
}

impl LeadUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.profile.is_none()
            && self.source_url.is_none()
            && self.contact_status.is_none()
    }
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// A generated outreach email stored in the CRM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: RecordId,
    /// Subject line.
    pub object: String,
    /// Body.
    pub text: String,
    pub email_type: EmailType,
    pub email_status: EmailStatus,
    /// The single lead this email is addressed to.
    pub recipient: RecordId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Input for creating an email record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmail {
    pub object: String,
    pub text: String,
    pub email_type: EmailType,
    pub email_status: EmailStatus,
    pub recipient: RecordId,
}

/// Normalize an email address for storage and comparison.
pub fn normalize_email(address: &str) -> String {
    address.trim().to_lowercase()
}
