//! Marketing platform API client - HTTP communication with Mailchimp
//!
//! The integration consumes a deliberately narrow surface: ping, audience
//! listing, member upsert/tag updates, batch submission, and the
//! three-step campaign flow. [`MarketingApi`] is the injection seam; the
//! sync engine and campaign pipeline only ever see the trait, so tests
//! run against an in-memory fake or a mock server.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::models::{
    Audience, BatchHandle, BatchOperation, Campaign, CampaignStatus, MemberTag, MemberUpsert,
    NewCampaign,
};
use crate::credentials::{CredentialError, CredentialResolver};

/// Marketing API error types
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthorized - check the configured API key")]
    Unauthorized,

    #[error("remote resource not found: {0}")]
    NotFound(String),

    #[error("member already exists")]
    MemberExists,

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("server error: {0}")]
    Server(String),

    #[error("invalid response from server")]
    InvalidResponse,
}

impl ApiError {
    /// Duplicate-member style errors are benign for idempotent sync loops.
    pub fn is_benign_duplicate(&self) -> bool {
        matches!(self, ApiError::MemberExists)
    }
}

/// The platform operations this system consumes.
#[async_trait]
pub trait MarketingApi: Send + Sync {
    /// Authenticated connectivity check.
    async fn ping(&self) -> Result<(), ApiError>;

    /// All audiences visible to the configured key.
    async fn list_audiences(&self) -> Result<Vec<Audience>, ApiError>;

    /// Create-or-replace a member, addressed by subscriber hash.
    async fn set_member(
        &self,
        audience_id: &str,
        member_hash: &str,
        member: &MemberUpsert,
    ) -> Result<(), ApiError>;

    /// Apply tag assignments to a member. Additive for `active` tags.
    async fn update_member_tags(
        &self,
        audience_id: &str,
        member_hash: &str,
        tags: &[MemberTag],
    ) -> Result<(), ApiError>;

    /// Submit independent operations as one server-side batch.
    async fn submit_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchHandle, ApiError>;

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, ApiError>;

    async fn set_campaign_content(&self, campaign_id: &str, html: &str) -> Result<(), ApiError>;

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ApiError>;
}

/// Configuration for the Mailchimp client, normally resolved from the
/// credential store.
#[derive(Debug, Clone)]
pub struct MailchimpConfig {
    pub api_key: String,
    pub server_prefix: String,
    pub from_name: String,
    pub reply_to: String,
}

impl MailchimpConfig {
    /// Resolve the Mailchimp configuration through the credential
    /// resolver (database override first, then environment).
    pub fn from_resolver(resolver: &CredentialResolver) -> Result<Self, CredentialError> {
        let api_key = resolver
            .plaintext("MAILCHIMP_API_KEY")?
            .ok_or_else(|| CredentialError::NotConfigured("MAILCHIMP_API_KEY".to_string()))?;
        let server_prefix = resolver
            .plaintext("MAILCHIMP_SERVER_PREFIX")?
            .ok_or_else(|| CredentialError::NotConfigured("MAILCHIMP_SERVER_PREFIX".to_string()))?;

        Ok(Self {
            api_key,
            server_prefix,
            from_name: "Aureon One".to_string(),
            reply_to: "hello@aureonone.in".to_string(),
        })
    }
}

/// Mailchimp REST client.
pub struct MailchimpClient {
    client: Client,
    base_url: String,
    api_key: String,
    from_name: String,
    reply_to: String,
}

impl MailchimpClient {
    pub fn new(config: MailchimpConfig) -> Result<Self, ApiError> {
        let base_url = format!("https://{}.api.mailchimp.com/3.0", config.server_prefix);
        Self::with_base_url(config, base_url)
    }

    /// Client pointed at an explicit base URL (used by tests to target a
    /// mock server).
    pub fn with_base_url(config: MailchimpConfig, base_url: String) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key,
            from_name: config.from_name,
            reply_to: config.reply_to,
        })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .basic_auth("anystring", Some(&self.api_key))
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth("anystring", Some(&self.api_key))
    }

    fn put(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .put(format!("{}{}", self.base_url, path))
            .basic_auth("anystring", Some(&self.api_key))
    }
}

#[async_trait]
impl MarketingApi for MailchimpClient {
    async fn ping(&self) -> Result<(), ApiError> {
        let response = self.get("/ping").send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn list_audiences(&self) -> Result<Vec<Audience>, ApiError> {
        let response = self.get("/lists?count=100").send().await?;
        let lists: AudienceList = handle_response(response).await?;
        Ok(lists.lists)
    }

    async fn set_member(
        &self,
        audience_id: &str,
        member_hash: &str,
        member: &MemberUpsert,
    ) -> Result<(), ApiError> {
        let response = self
            .put(&format!("/lists/{}/members/{}", audience_id, member_hash))
            .json(member)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn update_member_tags(
        &self,
        audience_id: &str,
        member_hash: &str,
        tags: &[MemberTag],
    ) -> Result<(), ApiError> {
        let response = self
            .post(&format!(
                "/lists/{}/members/{}/tags",
                audience_id, member_hash
            ))
            .json(&json!({ "tags": tags }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn submit_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchHandle, ApiError> {
        let response = self
            .post("/batches")
            .json(&json!({ "operations": operations }))
            .send()
            .await?;

        handle_response(response).await
    }

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, ApiError> {
        let body = json!({
            "type": "regular",
            "recipients": { "list_id": campaign.audience_id },
            "settings": {
                "subject_line": campaign.subject,
                "preview_text": campaign.preview_text,
                "title": campaign.title,
                "from_name": self.from_name,
                "reply_to": self.reply_to,
            },
        });

        let response = self.post("/campaigns").json(&body).send().await?;
        let created: CampaignCreated = handle_response(response).await?;

        Ok(Campaign {
            id: created.id,
            audience_id: campaign.audience_id.clone(),
            subject: campaign.subject.clone(),
            preview_text: campaign.preview_text.clone(),
            status: CampaignStatus::Draft,
        })
    }

    async fn set_campaign_content(&self, campaign_id: &str, html: &str) -> Result<(), ApiError> {
        let response = self
            .put(&format!("/campaigns/{}/content", campaign_id))
            .json(&json!({ "html": html }))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ApiError> {
        let response = self
            .post(&format!("/campaigns/{}/actions/send", campaign_id))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(handle_error(response).await)
        }
    }
}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct AudienceList {
    lists: Vec<Audience>,
}

#[derive(Debug, Deserialize)]
struct CampaignCreated {
    id: String,
}

/// Problem-detail body the platform returns on errors.
#[derive(Debug, Deserialize)]
struct ProblemDetail {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

// ============================================================================
// Error handling
// ============================================================================

/// Deserialize a successful JSON response, mapping failures to ApiError.
async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    if response.status().is_success() {
        response
            .json::<T>()
            .await
            .map_err(|_| ApiError::InvalidResponse)
    } else {
        Err(handle_error(response).await)
    }
}

/// Convert an error response into an ApiError.
async fn handle_error(response: reqwest::Response) -> ApiError {
    let status = response.status();

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => {
            let detail = problem_detail(response).await;
            ApiError::NotFound(detail)
        }
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
        StatusCode::BAD_REQUEST => {
            let body = response.text().await.unwrap_or_default();
            let problem: ProblemDetail = serde_json::from_str(&body).unwrap_or(ProblemDetail {
                title: String::new(),
                detail: body.clone(),
            });
            if problem.title.eq_ignore_ascii_case("Member Exists") {
                ApiError::MemberExists
            } else {
                ApiError::Server(format!("{}: {}", problem.title, problem.detail))
            }
        }
        _ => {
            let detail = problem_detail(response).await;
            ApiError::Server(format!("{}: {}", status.as_u16(), detail))
        }
    }
}

async fn problem_detail(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ProblemDetail>(&body) {
        Ok(p) if !p.detail.is_empty() => p.detail,
        Ok(p) => p.title,
        Err(_) => body,
    }
}
