//! In-memory `MarketingApi` implementation for tests
//!
//! Records every call so tests can assert on remote state without
//! touching the real platform. Failure injection covers the paths the
//! engine and pipeline must survive: duplicate members, server errors on
//! individual steps.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::api::{ApiError, MarketingApi};
use super::models::{
    Audience, AudienceStats, BatchHandle, BatchOperation, Campaign, CampaignStatus, MemberTag,
    MemberUpsert, NewCampaign,
};

#[derive(Default)]
struct FakeCampaign {
    content_set: bool,
    sent: bool,
}

#[derive(Default)]
struct State {
    members: HashMap<(String, String), MemberUpsert>,
    tags: HashMap<(String, String), Vec<MemberTag>>,
    batches: Vec<Vec<BatchOperation>>,
    campaigns: HashMap<String, FakeCampaign>,
    next_campaign: u64,
    member_failures: HashMap<(String, String), ApiError>,
    fail_next_set_content: Option<ApiError>,
}

/// Records and replays remote state in memory.
#[derive(Default)]
pub struct InMemoryMarketingApi {
    state: Mutex<State>,
}

// ApiError carries a non-cloneable reqwest variant; rebuild the variants
// the fake injects.
fn replay_error(e: &ApiError) -> ApiError {
    match e {
        ApiError::Unauthorized => ApiError::Unauthorized,
        ApiError::NotFound(s) => ApiError::NotFound(s.clone()),
        ApiError::MemberExists => ApiError::MemberExists,
        ApiError::RateLimited => ApiError::RateLimited,
        ApiError::Server(s) => ApiError::Server(s.clone()),
        _ => ApiError::InvalidResponse,
    }
}

impl InMemoryMarketingApi {
    /// Make every `set_member` call for this member fail with `error`.
    pub fn fail_member(&self, audience_id: &str, member_hash: &str, error: ApiError) {
        let mut state = self.state.lock().unwrap();
        state
            .member_failures
            .insert((audience_id.to_string(), member_hash.to_string()), error);
    }

    /// Make the next `set_campaign_content` call fail with `error`.
    pub fn fail_next_set_content(&self, error: ApiError) {
        self.state.lock().unwrap().fail_next_set_content = Some(error);
    }

    pub fn members_in(&self, audience_id: &str) -> Vec<MemberUpsert> {
        let state = self.state.lock().unwrap();
        state
            .members
            .iter()
            .filter(|((aud, _), _)| aud == audience_id)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn tags_for(&self, audience_id: &str, member_hash: &str) -> Vec<MemberTag> {
        let state = self.state.lock().unwrap();
        state
            .tags
            .get(&(audience_id.to_string(), member_hash.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn submitted_batches(&self) -> Vec<Vec<BatchOperation>> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn campaign_count(&self) -> usize {
        self.state.lock().unwrap().campaigns.len()
    }

    pub fn campaign_sent(&self, campaign_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .campaigns
            .get(campaign_id)
            .map(|c| c.sent)
            .unwrap_or(false)
    }
}

#[async_trait]
impl MarketingApi for InMemoryMarketingApi {
    async fn ping(&self) -> Result<(), ApiError> {
        Ok(())
    }

    async fn list_audiences(&self) -> Result<Vec<Audience>, ApiError> {
        let state = self.state.lock().unwrap();
        let mut audience_ids: Vec<&String> =
            state.members.keys().map(|(aud, _)| aud).collect();
        audience_ids.sort();
        audience_ids.dedup();

        Ok(audience_ids
            .into_iter()
            .map(|id| Audience {
                id: id.clone(),
                name: format!("Audience {}", id),
                stats: AudienceStats {
                    member_count: state.members.keys().filter(|(aud, _)| aud == id).count()
                        as i64,
                    ..Default::default()
                },
            })
            .collect())
    }

    async fn set_member(
        &self,
        audience_id: &str,
        member_hash: &str,
        member: &MemberUpsert,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let key = (audience_id.to_string(), member_hash.to_string());

        if let Some(error) = state.member_failures.get(&key) {
            return Err(replay_error(error));
        }

        state.members.insert(key, member.clone());
        Ok(())
    }

    async fn update_member_tags(
        &self,
        audience_id: &str,
        member_hash: &str,
        tags: &[MemberTag],
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        let key = (audience_id.to_string(), member_hash.to_string());
        if !state.members.contains_key(&key) {
            return Err(ApiError::NotFound(format!("member {}", member_hash)));
        }
        state.tags.insert(key, tags.to_vec());
        Ok(())
    }

    async fn submit_batch(&self, operations: Vec<BatchOperation>) -> Result<BatchHandle, ApiError> {
        let mut state = self.state.lock().unwrap();
        let total = operations.len() as i64;
        state.batches.push(operations);
        Ok(BatchHandle {
            id: format!("batch-{}", state.batches.len()),
            status: "pending".to_string(),
            total_operations: total,
        })
    }

    async fn create_campaign(&self, campaign: &NewCampaign) -> Result<Campaign, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.next_campaign += 1;
        let id = format!("campaign-{}", state.next_campaign);
        state.campaigns.insert(id.clone(), FakeCampaign::default());

        Ok(Campaign {
            id,
            audience_id: campaign.audience_id.clone(),
            subject: campaign.subject.clone(),
            preview_text: campaign.preview_text.clone(),
            status: CampaignStatus::Draft,
        })
    }

    async fn set_campaign_content(&self, campaign_id: &str, _html: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.fail_next_set_content.take() {
            return Err(error);
        }

        match state.campaigns.get_mut(campaign_id) {
            Some(c) if !c.sent => {
                c.content_set = true;
                Ok(())
            }
            Some(_) => Err(ApiError::Server("campaign already sent".to_string())),
            None => Err(ApiError::NotFound(format!("campaign {}", campaign_id))),
        }
    }

    async fn send_campaign(&self, campaign_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        match state.campaigns.get_mut(campaign_id) {
            Some(c) if c.content_set && !c.sent => {
                c.sent = true;
                Ok(())
            }
            Some(c) if c.sent => Err(ApiError::Server("campaign already sent".to_string())),
            Some(_) => Err(ApiError::Server("campaign has no content".to_string())),
            None => Err(ApiError::NotFound(format!("campaign {}", campaign_id))),
        }
    }
}
