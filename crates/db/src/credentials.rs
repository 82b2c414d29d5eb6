use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::repositories::{DocumentStore, Namespace, RepositoryError};

pub const DEFAULT_SESSION: &str = "default";
const BACKUP_MARKER: &str = ".backup-";

/// Opaque transport credential blob, persisted and reloaded verbatim.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionCredentials(pub Value);

impl SessionCredentials {
    pub fn empty() -> Self {
        Self(Value::Object(serde_json::Map::new()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredCredentials {
    credentials: SessionCredentials,
    saved_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialInfo {
    pub present: bool,
    pub saved_at: Option<DateTime<Utc>>,
}

pub struct CredentialStore {
    store: Arc<dyn DocumentStore>,
    session: String,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::for_session(store, DEFAULT_SESSION)
    }

    pub fn for_session(store: Arc<dyn DocumentStore>, session: impl Into<String>) -> Self {
        Self { store, session: session.into() }
    }

    async fn read(&self, key: &str) -> Result<Option<StoredCredentials>, RepositoryError> {
        let document = self.store.get(Namespace::Sessions, key).await?;
        document.map(serde_json::from_value).transpose().map_err(RepositoryError::from)
    }

    async fn write(
        &self,
        key: &str,
        credentials: &SessionCredentials,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let stored = StoredCredentials { credentials: credentials.clone(), saved_at: now };
        self.store.put(Namespace::Sessions, key, &serde_json::to_value(stored)?).await
    }

    pub async fn load(&self) -> Result<Option<SessionCredentials>, RepositoryError> {
        Ok(self.read(&self.session).await?.map(|stored| stored.credentials))
    }

    /// Loads persisted credentials, creating and persisting an empty blob on first run.
    pub async fn load_or_create(&self) -> Result<SessionCredentials, RepositoryError> {
        if let Some(credentials) = self.load().await? {
            return Ok(credentials);
        }
        let credentials = SessionCredentials::empty();
        self.write(&self.session, &credentials, Utc::now()).await?;
        info!(
            event_name = "store.credentials.created",
            session = %self.session,
            "no stored credentials, starting a new session"
        );
        Ok(credentials)
    }

    pub async fn save(&self, credentials: &SessionCredentials) -> Result<(), RepositoryError> {
        self.write(&self.session, credentials, Utc::now()).await
    }

    pub async fn clear(&self) -> Result<bool, RepositoryError> {
        self.store.delete(Namespace::Sessions, &self.session).await
    }

    pub async fn info(&self) -> Result<CredentialInfo, RepositoryError> {
        let stored = self.read(&self.session).await?;
        Ok(CredentialInfo {
            present: stored.as_ref().is_some_and(|stored| !stored.credentials.is_empty()),
            saved_at: stored.map(|stored| stored.saved_at),
        })
    }

    /// Copies the current credentials under a timestamped key. `None` when nothing is stored.
    pub async fn backup_at(&self, now: DateTime<Utc>) -> Result<Option<String>, RepositoryError> {
        let Some(stored) = self.read(&self.session).await? else {
            return Ok(None);
        };
        let key = format!("{}{BACKUP_MARKER}{}", self.session, now.format("%Y%m%dT%H%M%S%3fZ"));
        self.write(&key, &stored.credentials, now).await?;
        Ok(Some(key))
    }

    pub async fn backups(&self) -> Result<Vec<String>, RepositoryError> {
        let prefix = format!("{}{BACKUP_MARKER}", self.session);
        let mut keys = self
            .store
            .keys(Namespace::Sessions)
            .await?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect::<Vec<_>>();
        keys.sort();
        Ok(keys)
    }

    /// Replaces the live credentials with a backup. Returns false for an unknown backup.
    pub async fn restore(&self, backup_key: &str) -> Result<bool, RepositoryError> {
        let Some(stored) = self.read(backup_key).await? else {
            return Ok(false);
        };
        self.write(&self.session, &stored.credentials, Utc::now()).await?;
        Ok(true)
    }
}
