//! Marketing platform integration
//!
//! Everything that talks to the external email-marketing platform:
//! - `api` - the narrow REST surface this system consumes, behind the
//!   injectable [`MarketingApi`] trait (real client: Mailchimp)
//! - `models` - contacts, audiences, members, campaigns
//! - `engine` - idempotent contact sync addressed by subscriber hash
//! - `campaign` - the forward-only create -> content -> send pipeline
//!
//! Credentials reach this module already resolved and decrypted; see
//! [`crate::credentials`].

pub mod api;
pub mod campaign;
pub mod engine;
pub mod models;

#[cfg(test)]
pub(crate) mod testing;


pub use api::{ApiError, MailchimpClient, MailchimpConfig, MarketingApi};
pub use campaign::{
    newsletter_content, BlogPost, BroadcastContent, BroadcastRun, CampaignPipeline, PipelineError,
    PipelineStep,
};
pub use engine::{subscriber_hash, ContactSyncEngine, SyncError, SyncReport};
pub use models::{
    Audience, AudienceStats, BatchHandle, BatchOperation, Campaign, CampaignStatus, Contact,
    MemberTag, MemberUpsert, NewCampaign,
};
