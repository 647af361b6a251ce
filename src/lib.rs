//! # Aureon Core
//!
//! Marketing-integration core of the Aureon One platform: encrypted
//! storage for third-party API credentials, precedence-based credential
//! resolution (database override, then environment fallback), and
//! idempotent contact synchronization plus campaign broadcasting against
//! the email-marketing platform.
//!
//! Control flow for an administrative action: the resolver produces a
//! usable credential, the cipher decrypts it, and the sync engine uses it
//! to call the remote platform.

pub mod credentials;
pub mod crypto;
pub mod db;
pub mod marketing;

use std::path::PathBuf;
use std::sync::Arc;

use credentials::{CredentialError, CredentialResolver};
use crypto::{CredentialCipher, CryptoError};
use db::{Database, DbError};
use marketing::{CampaignPipeline, ContactSyncEngine, MailchimpClient, MailchimpConfig};

pub use credentials::{CredentialSource, ResolvedCredential, TestOutcome};
pub use marketing::{
    subscriber_hash, ApiError, Audience, BroadcastRun, Campaign, CampaignStatus, Contact,
    SyncReport,
};

/// Environment variable holding the process-wide encryption secret.
pub const ENCRYPTION_SECRET_VAR: &str = "API_ENCRYPTION_KEY";

/// Top-level error for facade operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("marketing API error: {0}")]
    Api(#[from] ApiError),
}

/// Wires the database, cipher, and resolver together and hands out
/// marketing components configured from resolved credentials.
pub struct AureonCore {
    db: Database,
    resolver: CredentialResolver,
}

impl AureonCore {
    /// Open a file-backed core with an explicitly provided encryption
    /// secret. The secret must be configured; there is deliberately no
    /// built-in development fallback.
    pub fn open(db_path: PathBuf, encryption_secret: &str) -> Result<Self, CoreError> {
        let db = Database::new(db_path)?;
        Self::with_database(db, encryption_secret)
    }

    /// Open with the secret taken from `API_ENCRYPTION_KEY` (a `.env`
    /// file is honored when present).
    pub fn open_from_env(db_path: PathBuf) -> Result<Self, CoreError> {
        dotenvy::dotenv().ok();
        let secret =
            std::env::var(ENCRYPTION_SECRET_VAR).map_err(|_| CryptoError::KeyNotConfigured)?;
        Self::open(db_path, &secret)
    }

    /// In-memory core (for testing).
    pub fn in_memory(encryption_secret: &str) -> Result<Self, CoreError> {
        Self::with_database(Database::in_memory()?, encryption_secret)
    }

    fn with_database(db: Database, encryption_secret: &str) -> Result<Self, CoreError> {
        let cipher = Arc::new(CredentialCipher::new(encryption_secret)?);
        let resolver = CredentialResolver::new(db.clone(), cipher);
        Ok(Self { db, resolver })
    }

    pub fn resolver(&self) -> &CredentialResolver {
        &self.resolver
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Build a Mailchimp client from the resolved credentials.
    pub fn marketing_client(&self) -> Result<MailchimpClient, CoreError> {
        let config = MailchimpConfig::from_resolver(&self.resolver)?;
        Ok(MailchimpClient::new(config)?)
    }

    /// Contact sync engine backed by the resolved Mailchimp client.
    pub fn sync_engine(&self) -> Result<ContactSyncEngine, CoreError> {
        let client = Arc::new(self.marketing_client()?);
        Ok(ContactSyncEngine::new(client, self.db.clone()))
    }

    /// Campaign pipeline backed by the resolved Mailchimp client.
    pub fn campaign_pipeline(&self) -> Result<CampaignPipeline, CoreError> {
        let client = Arc::new(self.marketing_client()?);
        Ok(CampaignPipeline::new(client))
    }
}
