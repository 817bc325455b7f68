//! Persisted session preferences: the auth grant and the bookkeeping flags
//! consulted when the presentation layer re-attaches.

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionState {
    #[serde(default)]
    pub is_authenticated: bool,
    /// Activation expiry, epoch millis UTC.  Zero when never authenticated.
    #[serde(default)]
    pub auth_expiry_ms: i64,
    #[serde(default)]
    pub auth_provider_id: String,
    /// When the presentation layer last detached, epoch millis.
    #[serde(default)]
    pub last_viewed_ms: i64,
    /// Set when the most recent catalog refresh failed; forces an eager
    /// refetch on the next attach instead of trusting the cache.
    #[serde(default)]
    pub error_on_last_refresh: bool,
}

/// Flat key/value session file.  Owned by the engine loop; every setter
/// writes through to disk so a crash never loses the auth grant.
pub struct SessionStore {
    state: SessionState,
    path: PathBuf,
}

impl SessionStore {
    pub fn open(path: PathBuf) -> Self {
        let state = Self::load(&path);
        Self { state, path }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn set_authenticated(
        &mut self,
        provider_id: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.state.is_authenticated = true;
        self.state.auth_provider_id = provider_id.to_string();
        self.state.auth_expiry_ms = expires_at.timestamp_millis();
        self.save()
    }

    /// Idempotent: clearing an already-clear session is a no-op write.
    pub fn clear_authentication(&mut self) -> anyhow::Result<()> {
        self.state.is_authenticated = false;
        self.state.auth_provider_id.clear();
        self.state.auth_expiry_ms = 0;
        self.save()
    }

    pub fn set_error_on_last_refresh(&mut self, error: bool) -> anyhow::Result<()> {
        if self.state.error_on_last_refresh == error {
            return Ok(());
        }
        self.state.error_on_last_refresh = error;
        self.save()
    }

    pub fn set_last_viewed(&mut self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.state.last_viewed_ms = now.timestamp_millis();
        self.save()
    }

    /// Whether the session was last viewed on the current local calendar day.
    pub fn last_viewed_today(&self) -> bool {
        if self.state.last_viewed_ms == 0 {
            return false;
        }
        match Local.timestamp_millis_opt(self.state.last_viewed_ms).single() {
            Some(then) => then.date_naive() == Local::now().date_naive(),
            None => false,
        }
    }

    /// Authenticated and (when an expiry was recorded) not yet expired.
    pub fn auth_valid(&self, now: DateTime<Utc>) -> bool {
        self.state.is_authenticated
            && (self.state.auth_expiry_ms == 0
                || now.timestamp_millis() < self.state.auth_expiry_ms)
    }

    fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    fn load(path: &PathBuf) -> SessionState {
        if let Ok(content) = std::fs::read_to_string(path) {
            match serde_json::from_str::<SessionState>(&content) {
                Ok(state) => return state,
                Err(e) => {
                    tracing::warn!("corrupt session file {:?}, starting fresh: {}", path, e);
                }
            }
        }
        SessionState::default()
    }
}
