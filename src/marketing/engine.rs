//! Contact sync engine - idempotent reconciliation against an audience
//!
//! Remote members are addressed exclusively by a deterministic hash of
//! the lower-cased email address, so repeated syncs of the same contact
//! (in any casing) land on the same remote record and never duplicate it.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::api::{ApiError, MarketingApi};
use super::models::{BatchHandle, BatchOperation, Contact, MemberTag, MemberUpsert};
use crate::db::{Database, DbError};

/// Sync error types
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("marketing API error: {0}")]
    Api(#[from] ApiError),

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Per-run outcome of a sequential contact sync.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub synced: usize,
    /// Contacts skipped because the platform reported a benign duplicate.
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn processed(&self) -> usize {
        self.synced + self.skipped + self.failed
    }
}

/// Stable remote member id: SHA-256 of the trimmed, lower-cased email.
///
/// Case-insensitive by construction; collision resistance is delegated to
/// the hash.
pub fn subscriber_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

/// Reconciles local contacts against a remote audience.
pub struct ContactSyncEngine {
    api: Arc<dyn MarketingApi>,
    db: Database,
}

impl ContactSyncEngine {
    pub fn new(api: Arc<dyn MarketingApi>, db: Database) -> Self {
        Self { api, db }
    }

    /// Create-or-replace one contact, then reconcile its tags.
    ///
    /// The upsert is addressed by [`subscriber_hash`], making the call
    /// idempotent. Supplied tags are applied as `active`; tags the member
    /// already carries but which are absent here are left in place - the
    /// remote tag call is additive, not a full replace.
    pub async fn upsert_contact(
        &self,
        audience_id: &str,
        contact: &Contact,
        tags: Option<&[String]>,
    ) -> Result<(), SyncError> {
        let member_hash = subscriber_hash(&contact.email);
        let member = MemberUpsert::from_contact(contact);

        self.api
            .set_member(audience_id, &member_hash, &member)
            .await?;

        let effective_tags: Vec<MemberTag> = match tags {
            Some(explicit) => explicit.iter().map(MemberTag::active).collect(),
            None => contact.tags.iter().map(MemberTag::active).collect(),
        };

        if !effective_tags.is_empty() {
            self.api
                .update_member_tags(audience_id, &member_hash, &effective_tags)
                .await?;
        }

        Ok(())
    }

    /// Sync a set of contacts sequentially, catching per-item failures so
    /// one bad record never aborts the run.
    ///
    /// Duplicate-member errors are benign and counted as skipped; other
    /// failures are counted with their reasons. The run is recorded in
    /// the sync audit log.
    pub async fn sync_contacts(
        &self,
        audience_id: &str,
        contacts: &[Contact],
    ) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();

        for contact in contacts {
            match self.upsert_contact(audience_id, contact, None).await {
                Ok(()) => report.synced += 1,
                Err(SyncError::Api(e)) if e.is_benign_duplicate() => {
                    log::info!("skipping existing member {}", contact.email);
                    report.skipped += 1;
                }
                Err(e) => {
                    log::error!("failed to sync contact {}: {}", contact.email, e);
                    report.errors.push(format!("{}: {}", contact.email, e));
                    report.failed += 1;
                }
            }
        }

        let status = if report.is_success() { "SUCCESS" } else { "PARTIAL" };
        let error_message = if report.errors.is_empty() {
            None
        } else {
            Some(report.errors.join("; "))
        };
        if let Err(e) = self.db.log_sync(
            "CONTACT_SYNC",
            status,
            report.synced as i64,
            error_message.as_deref(),
        ) {
            // A broken audit log must not discard the sync outcome.
            log::warn!("failed to record sync log entry: {}", e);
        }

        log::info!(
            "contact sync to audience {}: {} synced, {} skipped, {} failed",
            audience_id,
            report.synced,
            report.skipped,
            report.failed
        );

        Ok(report)
    }

    /// Submit all contacts as one remote batch of independent upserts.
    ///
    /// The platform processes operations server-side; individual failures
    /// inside the batch do not fail this call. The returned handle carries
    /// the remote batch id so a caller that needs per-item confirmation
    /// can poll batch status later - this engine does not poll.
    pub async fn batch_upsert_contacts(
        &self,
        audience_id: &str,
        contacts: &[Contact],
    ) -> Result<BatchHandle, SyncError> {
        let operations: Vec<BatchOperation> = contacts
            .iter()
            .map(|contact| {
                let member = MemberUpsert::from_contact(contact);
                BatchOperation {
                    method: "PUT".to_string(),
                    path: format!(
                        "/lists/{}/members/{}",
                        audience_id,
                        subscriber_hash(&contact.email)
                    ),
                    body: serde_json::to_string(&member).unwrap_or_default(),
                }
            })
            .collect();

        let total = operations.len();
        let handle = self.api.submit_batch(operations).await?;

        if let Err(e) = self
            .db
            .log_sync("CONTACT_BATCH", "SUBMITTED", total as i64, None)
        {
            log::warn!("failed to record batch log entry: {}", e);
        }

        log::info!(
            "submitted batch {} with {} operations to audience {}",
            handle.id,
            total,
            audience_id
        );

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketing::testing::InMemoryMarketingApi;

    fn engine() -> (Arc<InMemoryMarketingApi>, ContactSyncEngine) {
        let api = Arc::new(InMemoryMarketingApi::default());
        let db = Database::in_memory().expect("db");
        let engine = ContactSyncEngine::new(api.clone(), db);
        (api, engine)
    }

    #[test]
    fn test_subscriber_hash_is_case_insensitive() {
        assert_eq!(
            subscriber_hash("Jane@Example.com"),
            subscriber_hash("jane@example.com")
        );
        assert_eq!(subscriber_hash(" jane@example.com "), subscriber_hash("jane@example.com"));
        assert_ne!(
            subscriber_hash("jane@example.com"),
            subscriber_hash("john@example.com")
        );
        assert_eq!(subscriber_hash("jane@example.com").len(), 64);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_across_casing() {
        let (api, engine) = engine();

        let mut first = Contact::new("Jane@Example.com");
        first.first_name = Some("Jane".to_string());
        engine
            .upsert_contact("aud1", &first, None)
            .await
            .expect("first upsert");

        let mut second = Contact::new("jane@example.com");
        second.first_name = Some("Janet".to_string());
        engine
            .upsert_contact("aud1", &second, None)
            .await
            .expect("second upsert");

        // Exactly one remote member, last write wins on merge fields.
        let members = api.members_in("aud1");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].merge_fields["FNAME"], "Janet");
    }

    #[tokio::test]
    async fn test_upsert_applies_tags() {
        let (api, engine) = engine();

        let mut contact = Contact::new("tagged@example.com");
        contact.tags = vec!["newsletter".to_string()];
        let explicit = vec!["vip".to_string(), "lead".to_string()];
        engine
            .upsert_contact("aud1", &contact, Some(explicit.as_slice()))
            .await
            .expect("upsert");

        // Explicit tags take precedence over the contact's own tag set.
        let tags = api.tags_for("aud1", &subscriber_hash("tagged@example.com"));
        let names: Vec<_> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["vip", "lead"]);
        assert!(tags.iter().all(|t| t.status == "active"));
    }

    #[tokio::test]
    async fn test_sync_loop_counts_and_continues() {
        let (api, engine) = engine();

        api.fail_member("aud1", &subscriber_hash("dupe@example.com"), ApiError::MemberExists);
        api.fail_member(
            "aud1",
            &subscriber_hash("broken@example.com"),
            ApiError::Server("500: boom".to_string()),
        );

        let contacts = vec![
            Contact::new("good@example.com"),
            Contact::new("dupe@example.com"),
            Contact::new("broken@example.com"),
            Contact::new("also-good@example.com"),
        ];

        let report = engine
            .sync_contacts("aud1", &contacts)
            .await
            .expect("sync must complete");

        assert_eq!(report.synced, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("broken@example.com"));
        assert!(!report.is_success());
        assert_eq!(report.processed(), 4);
    }

    #[tokio::test]
    async fn test_sync_writes_audit_log() {
        let api = Arc::new(InMemoryMarketingApi::default());
        let db = Database::in_memory().expect("db");
        let engine = ContactSyncEngine::new(api, db.clone());

        engine
            .sync_contacts("aud1", &[Contact::new("one@example.com")])
            .await
            .expect("sync");

        let logs = db.recent_sync_logs(5).expect("logs");
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "CONTACT_SYNC");
        assert_eq!(logs[0].status, "SUCCESS");
        assert_eq!(logs[0].records_processed, 1);
    }

    #[tokio::test]
    async fn test_batch_addresses_duplicates_identically() {
        let (api, engine) = engine();

        let contacts = vec![
            Contact::new("same@example.com"),
            Contact::new("SAME@example.com"),
            Contact::new("other@example.com"),
        ];

        let handle = engine
            .batch_upsert_contacts("aud1", &contacts)
            .await
            .expect("batch");
        assert_eq!(handle.total_operations, 3);

        let batches = api.submitted_batches();
        assert_eq!(batches.len(), 1);
        let ops = &batches[0];
        assert_eq!(ops.len(), 3);
        // The two casings of the same address hit the same member path, so
        // at most one effective remote record results.
        assert_eq!(ops[0].path, ops[1].path);
        assert_ne!(ops[0].path, ops[2].path);
        assert!(ops.iter().all(|op| op.method == "PUT"));
    }
}
