//! Credential resolution with database-over-environment precedence
//!
//! For each named configuration key the effective value comes from the
//! encrypted database override when one exists and decrypts, otherwise
//! from the environment fallback. Administrative saves and deletes only
//! ever touch the database row; the environment is read-only here.
//!
//! Resolved plaintexts are cached for five minutes and invalidated on
//! save/delete, matching the admin dashboard's expectations.

use crate::crypto::{CredentialCipher, CryptoError};
use crate::db::{Database, DbError};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const CACHE_TTL_SECS: u64 = 300;
const CACHE_CAPACITY: u64 = 64;

/// Provenance of an effective credential value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    Database,
    Environment,
    None,
}

/// How the connectivity probe authenticates against the owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeAuth {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `Authorization: Key <key>` (Fal.ai style)
    KeyHeader,
    /// `?key=<key>` query parameter (Google style)
    QueryParam,
}

/// Static definition of a configurable credential.
#[derive(Debug, Clone)]
pub struct CredentialDefinition {
    pub key: &'static str,
    pub product: &'static str,
    pub description: &'static str,
    pub required: bool,
    pub test_endpoint: Option<&'static str>,
    pub auth: ProbeAuth,
    /// Environment variable consulted when no database row exists.
    pub env_fallback: &'static str,
}

/// All credentials the platform knows how to store and probe.
pub const CREDENTIAL_DEFINITIONS: &[CredentialDefinition] = &[
    CredentialDefinition {
        key: "OPENAI_API_KEY",
        product: "Strategy/Agency/Growth",
        description: "OpenAI GPT models for AI features",
        required: true,
        test_endpoint: Some("https://api.openai.com/v1/models"),
        auth: ProbeAuth::Bearer,
        env_fallback: "OPENAI_API_KEY",
    },
    CredentialDefinition {
        key: "FAL_API_KEY",
        product: "Forge",
        description: "Fal.ai image generation (Flux)",
        required: false,
        test_endpoint: Some("https://fal.run/fal-ai/flux/schnell"),
        auth: ProbeAuth::KeyHeader,
        env_fallback: "FAL_API_KEY",
    },
    CredentialDefinition {
        key: "RUNWAY_API_KEY",
        product: "Forge",
        description: "Runway video generation (Gen-3)",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::Bearer,
        env_fallback: "RUNWAY_API_KEY",
    },
    CredentialDefinition {
        key: "KLING_API_KEY",
        product: "Forge",
        description: "Kling video generation",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::Bearer,
        env_fallback: "KLING_API_KEY",
    },
    CredentialDefinition {
        key: "GOOGLE_AI_API_KEY",
        product: "Forge",
        description: "Google Gemini AI",
        required: false,
        test_endpoint: Some("https://generativelanguage.googleapis.com/v1beta/models"),
        auth: ProbeAuth::QueryParam,
        env_fallback: "GOOGLE_AI_API_KEY",
    },
    CredentialDefinition {
        key: "RESEND_API_KEY",
        product: "Email",
        description: "Resend email service",
        required: true,
        test_endpoint: Some("https://api.resend.com/domains"),
        auth: ProbeAuth::Bearer,
        env_fallback: "RESEND_API_KEY",
    },
    CredentialDefinition {
        key: "SENDGRID_API_KEY",
        product: "Email",
        description: "SendGrid fallback email",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::Bearer,
        env_fallback: "SENDGRID_API_KEY",
    },
    CredentialDefinition {
        key: "GOOGLE_PAGESPEED_API_KEY",
        product: "Analytics",
        description: "Google PageSpeed Insights",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::QueryParam,
        env_fallback: "GOOGLE_PAGESPEED_API_KEY",
    },
    CredentialDefinition {
        key: "MAILCHIMP_API_KEY",
        product: "Marketing",
        description: "Mailchimp marketing platform",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::Bearer,
        env_fallback: "MAILCHIMP_API_KEY",
    },
    CredentialDefinition {
        key: "MAILCHIMP_SERVER_PREFIX",
        product: "Marketing",
        description: "Mailchimp datacenter prefix (e.g. us21)",
        required: false,
        test_endpoint: None,
        auth: ProbeAuth::Bearer,
        env_fallback: "MAILCHIMP_SERVER_PREFIX",
    },
];

/// Find a definition by key name.
pub fn find_definition(key: &str) -> Option<&'static CredentialDefinition> {
    CREDENTIAL_DEFINITIONS.iter().find(|d| d.key == key)
}

/// Resolver error types
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("unknown credential key: {0}")]
    UnknownKey(String),

    #[error("credential {0} is not configured")]
    NotConfigured(String),

    #[error("database error: {0}")]
    Db(#[from] DbError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("connectivity probe failed: {0}")]
    Probe(#[from] reqwest::Error),
}

/// The resolved state of a credential, safe for display.
///
/// Full plaintext is intentionally absent; callers on the sync path use
/// [`CredentialResolver::plaintext`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedCredential {
    pub key: String,
    pub product: String,
    pub description: String,
    pub is_configured: bool,
    pub masked_value: Option<String>,
    pub source: CredentialSource,
    pub last_updated: Option<String>,
}

/// Result of a connectivity probe against the owning service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub success: bool,
    pub message: String,
    pub status_code: Option<u16>,
}

/// Resolves effective credential values with DB-over-environment
/// precedence.
#[derive(Clone)]
pub struct CredentialResolver {
    db: Database,
    cipher: Arc<CredentialCipher>,
    cache: Cache<String, Option<String>>,
    http: reqwest::Client,
}

impl CredentialResolver {
    pub fn new(db: Database, cipher: Arc<CredentialCipher>) -> Self {
        Self {
            db,
            cipher,
            cache: Cache::builder()
                .max_capacity(CACHE_CAPACITY)
                .time_to_live(Duration::from_secs(CACHE_TTL_SECS))
                .build(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Effective plaintext for a key, or `None` when unconfigured.
    ///
    /// Priority: database override, then environment fallback. A database
    /// row that fails to decrypt degrades to the fallback rather than
    /// failing the call; the corruption is logged.
    pub fn plaintext(&self, key: &str) -> Result<Option<String>, CredentialError> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached);
        }

        let value = self.resolve_uncached(key)?.map(|(plaintext, _)| plaintext);
        self.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Resolve the displayable state of a single credential.
    pub fn resolve(&self, key: &str) -> Result<ResolvedCredential, CredentialError> {
        let definition =
            find_definition(key).ok_or_else(|| CredentialError::UnknownKey(key.to_string()))?;
        self.resolve_definition(definition)
    }

    /// Resolve every known credential (admin configuration view).
    pub fn resolve_all(&self) -> Result<Vec<ResolvedCredential>, CredentialError> {
        CREDENTIAL_DEFINITIONS
            .iter()
            .map(|d| self.resolve_definition(d))
            .collect()
    }

    fn resolve_definition(
        &self,
        definition: &CredentialDefinition,
    ) -> Result<ResolvedCredential, CredentialError> {
        let mut resolved = ResolvedCredential {
            key: definition.key.to_string(),
            product: definition.product.to_string(),
            description: definition.description.to_string(),
            is_configured: false,
            masked_value: None,
            source: CredentialSource::None,
            last_updated: None,
        };

        match self.resolve_uncached(definition.key)? {
            Some((plaintext, CredentialSource::Database)) => {
                resolved.is_configured = true;
                resolved.source = CredentialSource::Database;
                resolved.masked_value = Some(mask(&plaintext));
                resolved.last_updated = self
                    .db
                    .get_credential(definition.key)?
                    .map(|r| r.updated_at);
            }
            Some((plaintext, _)) => {
                resolved.is_configured = true;
                resolved.source = CredentialSource::Environment;
                resolved.masked_value = Some(mask(&plaintext));
            }
            None => {}
        }

        Ok(resolved)
    }

    /// Core precedence logic, uncached.
    fn resolve_uncached(
        &self,
        key: &str,
    ) -> Result<Option<(String, CredentialSource)>, CredentialError> {
        if let Some(record) = self.db.get_credential(key)? {
            match self.cipher.decrypt(&record.value) {
                Ok(plaintext) if !plaintext.is_empty() => {
                    return Ok(Some((plaintext, CredentialSource::Database)));
                }
                Ok(_) => {
                    log::warn!("credential {} has an empty stored value, falling back", key);
                }
                Err(e) => {
                    // A corrupted row degrades to "missing" at this boundary
                    // so one bad record cannot fail the whole request.
                    log::error!("failed to decrypt stored credential {}: {}", key, e);
                }
            }
        }

        let env_key = find_definition(key).map(|d| d.env_fallback).unwrap_or(key);
        match std::env::var(env_key) {
            Ok(value) if !value.is_empty() => Ok(Some((value, CredentialSource::Environment))),
            _ => Ok(None),
        }
    }

    /// Encrypt and upsert the database override for a key.
    ///
    /// Never writes to the environment fallback.
    pub fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let definition =
            find_definition(key).ok_or_else(|| CredentialError::UnknownKey(key.to_string()))?;

        let envelope = self.cipher.encrypt(value.trim())?;
        self.db
            .upsert_credential(key, &envelope, Some(definition.description))?;
        self.cache.invalidate(key);

        log::info!("saved credential override for {}", key);
        Ok(())
    }

    /// Remove the database override for a key.
    ///
    /// Resolution then falls through to the environment fallback if one is
    /// set; deletion is non-destructive to environment-level values.
    pub fn delete(&self, key: &str) -> Result<(), CredentialError> {
        let existed = self.db.delete_credential(key)?;
        self.cache.invalidate(key);

        if existed {
            log::info!("deleted credential override for {}", key);
        }
        Ok(())
    }

    /// Probe the owning service with the effective credential.
    ///
    /// Purely diagnostic - nothing is persisted. The failure message
    /// carries the remote status code so administrators can diagnose the
    /// specific service.
    pub async fn test(&self, key: &str) -> Result<TestOutcome, CredentialError> {
        let definition =
            find_definition(key).ok_or_else(|| CredentialError::UnknownKey(key.to_string()))?;

        let Some(secret) = self.plaintext(key)? else {
            return Ok(TestOutcome {
                success: false,
                message: "API key not configured".to_string(),
                status_code: None,
            });
        };

        let Some(endpoint) = definition.test_endpoint else {
            // No probe endpoint: sanity-check the format only.
            if secret.len() < 10 {
                return Ok(TestOutcome {
                    success: false,
                    message: "API key appears too short".to_string(),
                    status_code: None,
                });
            }
            return Ok(TestOutcome {
                success: true,
                message: "API key format looks valid (no test endpoint available)".to_string(),
                status_code: None,
            });
        };

        let request = match definition.auth {
            ProbeAuth::Bearer => self.http.get(endpoint).bearer_auth(&secret),
            ProbeAuth::KeyHeader => self
                .http
                .get(endpoint)
                .header("Authorization", format!("Key {}", secret)),
            ProbeAuth::QueryParam => self.http.get(endpoint).query(&[("key", secret.as_str())]),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return Ok(TestOutcome {
                    success: false,
                    message: format!("connection failed: {}", e),
                    status_code: None,
                });
            }
        };

        let status = response.status();
        let outcome = if status.is_success() {
            TestOutcome {
                success: true,
                message: "API key is valid and working".to_string(),
                status_code: Some(status.as_u16()),
            }
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            TestOutcome {
                success: false,
                message: "API key is invalid or expired".to_string(),
                status_code: Some(401),
            }
        } else if status == reqwest::StatusCode::FORBIDDEN {
            TestOutcome {
                success: false,
                message: "API key lacks required permissions".to_string(),
                status_code: Some(403),
            }
        } else {
            TestOutcome {
                success: false,
                message: format!("API returned status {}", status.as_u16()),
                status_code: Some(status.as_u16()),
            }
        };

        Ok(outcome)
    }

    /// Drop the cached plaintext for one key, or everything.
    pub fn clear_cache(&self, key: Option<&str>) {
        match key {
            Some(k) => self.cache.invalidate(k),
            None => self.cache.invalidate_all(),
        }
    }
}

/// Masked display form of a secret: first 4 and last 4 characters with an
/// ellipsis between, or stars when too short to show anything safely.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
