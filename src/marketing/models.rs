//! Data types for the marketing platform integration
//!
//! Local contact records, remote audience/member shapes, and the campaign
//! lifecycle. Wire types mirror the platform's REST payloads; everything
//! else is owned locally.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A local contact record to reconcile against a remote audience.
///
/// Identity is the email address, compared case-insensitively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contact {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub merge_fields: Map<String, Value>,
}

impl Contact {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }
}

/// A remote audience (mailing list). Owned by the platform; membership
/// counts are informational, not authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    pub id: String,
    pub name: String,
    pub stats: AudienceStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudienceStats {
    #[serde(default)]
    pub member_count: i64,
    #[serde(default)]
    pub unsubscribe_count: i64,
    #[serde(default)]
    pub cleaned_count: i64,
}

/// Member upsert payload: create-or-replace addressed by subscriber hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberUpsert {
    pub email_address: String,
    pub status: String,
    pub merge_fields: Map<String, Value>,
}

impl MemberUpsert {
    /// Build the upsert payload for a contact. Standard merge fields are
    /// always present (empty when the contact omits them); custom merge
    /// fields are layered on top.
    pub fn from_contact(contact: &Contact) -> Self {
        let mut merge_fields = Map::new();
        merge_fields.insert(
            "FNAME".to_string(),
            Value::String(contact.first_name.clone().unwrap_or_default()),
        );
        merge_fields.insert(
            "LNAME".to_string(),
            Value::String(contact.last_name.clone().unwrap_or_default()),
        );
        merge_fields.insert(
            "PHONE".to_string(),
            Value::String(contact.phone.clone().unwrap_or_default()),
        );
        for (k, v) in &contact.merge_fields {
            merge_fields.insert(k.clone(), v.clone());
        }

        Self {
            email_address: contact.email.clone(),
            status: "subscribed".to_string(),
            merge_fields,
        }
    }
}

/// A tag assignment for a remote member. `status: "active"` attaches the
/// tag; the update call is additive and never strips tags it does not
/// name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberTag {
    pub name: String,
    pub status: String,
}

impl MemberTag {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: "active".to_string(),
        }
    }
}

/// One operation inside a remote batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Handle for a submitted batch. The platform processes operations
/// server-side; callers poll by id when per-item confirmation matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchHandle {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub total_operations: i64,
}

/// Parameters for creating a campaign. Sender identity comes from the
/// client's configuration, not from callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCampaign {
    pub audience_id: String,
    pub subject: String,
    pub preview_text: Option<String>,
    pub title: String,
}

/// Lifecycle of a broadcast campaign. Strictly forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    ContentSet,
    Sent,
}

/// A transient campaign created for a single broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub audience_id: String,
    pub subject: String,
    pub preview_text: Option<String>,
    pub status: CampaignStatus,
}
