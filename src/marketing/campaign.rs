//! Campaign pipeline - create, set content, send
//!
//! A broadcast campaign moves strictly forward through
//! `Draft -> ContentSet -> Sent` with no rollback. Each step is guarded
//! locally so a campaign can never be sent without content, and a
//! [`BroadcastRun`] keeps the last completed step so a failed composite
//! run resumes where it stopped instead of restarting blindly.

use std::sync::Arc;

use super::api::{ApiError, MarketingApi};
use super::models::{Campaign, CampaignStatus, NewCampaign};

/// Pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("marketing API error: {0}")]
    Api(#[from] ApiError),

    #[error("campaign content must be set before sending")]
    ContentNotSet,

    #[error("campaign has already been sent")]
    AlreadySent,
}

/// The three forward-only steps of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Create,
    SetContent,
    Send,
}

/// Content for a single broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastContent {
    pub subject: String,
    pub preview_text: Option<String>,
    pub html: String,
}

/// A blog post to broadcast as a newsletter.
#[derive(Debug, Clone)]
pub struct BlogPost {
    pub title: String,
    pub excerpt: String,
    pub slug: String,
    pub featured_image: Option<String>,
    pub author: String,
}

/// Resumable state of a composite broadcast run.
///
/// On failure the run retains the campaign created so far and the last
/// completed step; calling [`CampaignPipeline::send_broadcast`] again
/// picks up from there. There is no compensating delete of a
/// half-created campaign - the remote platform keeps whatever the last
/// successful step produced.
#[derive(Debug, Clone)]
pub struct BroadcastRun {
    pub audience_id: String,
    pub content: BroadcastContent,
    pub campaign: Option<Campaign>,
    pub last_completed_step: Option<PipelineStep>,
}

impl BroadcastRun {
    pub fn new(audience_id: impl Into<String>, content: BroadcastContent) -> Self {
        Self {
            audience_id: audience_id.into(),
            content,
            campaign: None,
            last_completed_step: None,
        }
    }
}

/// Drives campaigns through the forward-only broadcast pipeline.
pub struct CampaignPipeline {
    api: Arc<dyn MarketingApi>,
}

impl CampaignPipeline {
    pub fn new(api: Arc<dyn MarketingApi>) -> Self {
        Self { api }
    }

    /// Create a draft campaign targeting an audience.
    ///
    /// An invalid audience id surfaces as a remote API error; the
    /// platform owns audience validity.
    pub async fn create(
        &self,
        audience_id: &str,
        subject: &str,
        preview_text: Option<&str>,
    ) -> Result<Campaign, PipelineError> {
        let campaign = self
            .api
            .create_campaign(&NewCampaign {
                audience_id: audience_id.to_string(),
                subject: subject.to_string(),
                preview_text: preview_text.map(str::to_string),
                title: subject.to_string(),
            })
            .await?;

        log::info!("created campaign {} for audience {}", campaign.id, audience_id);
        Ok(campaign)
    }

    /// Set the HTML content of a draft campaign.
    pub async fn set_content(
        &self,
        campaign: &mut Campaign,
        html: &str,
    ) -> Result<(), PipelineError> {
        if campaign.status == CampaignStatus::Sent {
            return Err(PipelineError::AlreadySent);
        }

        self.api.set_campaign_content(&campaign.id, html).await?;
        campaign.status = CampaignStatus::ContentSet;
        Ok(())
    }

    /// Send a campaign. Terminal - no edits afterwards.
    ///
    /// Guarded locally: sending before content is set is rejected here
    /// rather than left to the remote platform.
    pub async fn send(&self, campaign: &mut Campaign) -> Result<(), PipelineError> {
        match campaign.status {
            CampaignStatus::Sent => return Err(PipelineError::AlreadySent),
            CampaignStatus::Draft => return Err(PipelineError::ContentNotSet),
            CampaignStatus::ContentSet => {}
        }

        self.api.send_campaign(&campaign.id).await?;
        campaign.status = CampaignStatus::Sent;
        log::info!("campaign {} sent", campaign.id);
        Ok(())
    }

    /// Run (or resume) the composite create -> set content -> send flow.
    ///
    /// Failures propagate to the caller; the run's `campaign` and
    /// `last_completed_step` record exactly how far it got.
    pub async fn send_broadcast(&self, run: &mut BroadcastRun) -> Result<(), PipelineError> {
        if run.last_completed_step == Some(PipelineStep::Send) {
            return Err(PipelineError::AlreadySent);
        }

        if run.campaign.is_none() {
            let campaign = self
                .create(
                    &run.audience_id,
                    &run.content.subject,
                    run.content.preview_text.as_deref(),
                )
                .await?;
            run.campaign = Some(campaign);
            run.last_completed_step = Some(PipelineStep::Create);
        }

        // The campaign is present past this point; split the borrow so the
        // step methods can mutate it.
        let html = run.content.html.clone();
        let campaign = run
            .campaign
            .as_mut()
            .ok_or(PipelineError::ContentNotSet)?;

        if campaign.status == CampaignStatus::Draft {
            self.set_content(campaign, &html).await?;
            run.last_completed_step = Some(PipelineStep::SetContent);
        }

        let campaign = run
            .campaign
            .as_mut()
            .ok_or(PipelineError::ContentNotSet)?;
        self.send(campaign).await?;
        run.last_completed_step = Some(PipelineStep::Send);

        Ok(())
    }

    /// Broadcast a blog post as a newsletter to an audience.
    pub async fn send_blog_newsletter(
        &self,
        audience_id: &str,
        post: &BlogPost,
        base_url: &str,
    ) -> Result<BroadcastRun, (BroadcastRun, PipelineError)> {
        let mut run = BroadcastRun::new(audience_id, newsletter_content(post, base_url));
        match self.send_broadcast(&mut run).await {
            Ok(()) => Ok(run),
            Err(e) => Err((run, e)),
        }
    }
}

/// Render a blog post into broadcast content.
///
/// Preview text is the excerpt truncated to 150 characters on a char
/// boundary; the footer carries the platform's unsubscribe merge tag.
pub fn newsletter_content(post: &BlogPost, base_url: &str) -> BroadcastContent {
    let preview: String = post.excerpt.chars().take(150).collect();
    BroadcastContent {
        subject: post.title.clone(),
        preview_text: Some(preview),
        html: render_newsletter_html(post, base_url),
    }
}

fn render_newsletter_html(post: &BlogPost, base_url: &str) -> String {
    let blog_url = format!("{}/blog/{}", base_url.trim_end_matches('/'), post.slug);

    let featured = post
        .featured_image
        .as_deref()
        .map(|src| {
            format!(
                r#"<tr><td><img src="{}" alt="{}" style="width: 100%; height: auto; display: block;"></td></tr>"#,
                src, post.title
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{title}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Arial, sans-serif; background-color: #0A0A0A;">
  <table width="100%" cellpadding="0" cellspacing="0" style="background-color: #0A0A0A;">
    <tr>
      <td align="center" style="padding: 40px 20px;">
        <table width="600" cellpadding="0" cellspacing="0" style="background-color: #1A1A1A; border-radius: 12px; overflow: hidden;">
          <tr>
            <td style="padding: 40px; text-align: center; background-color: #18181B;">
              <h1 style="margin: 0; color: #FFFFFF; font-size: 28px; font-weight: bold;">Aureon One</h1>
            </td>
          </tr>
          {featured}
          <tr>
            <td style="padding: 40px;">
              <h2 style="margin: 0 0 20px 0; color: #FFFFFF; font-size: 24px; font-weight: bold;">{title}</h2>
              <p style="margin: 0 0 20px 0; color: #D1D5DB; font-size: 16px; line-height: 1.6;">{excerpt}</p>
              <p style="margin: 0 0 30px 0; color: #9CA3AF; font-size: 14px;">By {author}</p>
              <table cellpadding="0" cellspacing="0">
                <tr>
                  <td style="border-radius: 8px; background-color: #F59E0B;">
                    <a href="{blog_url}" style="display: inline-block; padding: 16px 32px; color: #000000; text-decoration: none; font-weight: bold; font-size: 16px;">Read Full Article</a>
                  </td>
                </tr>
              </table>
            </td>
          </tr>
          <tr>
            <td style="padding: 30px; text-align: center; background-color: #0A0A0A; border-top: 1px solid #2A2A2A;">
              <p style="margin: 0 0 10px 0; color: #9CA3AF; font-size: 14px;">&copy; 2025 Aureon One. All rights reserved.</p>
              <p style="margin: 0; color: #6B7280; font-size: 12px;">
                <a href="*|UNSUB|*" style="color: #F59E0B; text-decoration: none;">Unsubscribe</a> |
                <a href="{base_url}" style="color: #F59E0B; text-decoration: none;">Visit Website</a>
              </p>
            </td>
          </tr>
        </table>
      </td>
    </tr>
  </table>
</body>
</html>"#,
        title = post.title,
        excerpt = post.excerpt,
        author = post.author,
        featured = featured,
        blog_url = blog_url,
        base_url = base_url,
    )
}
