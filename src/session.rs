//! Persisted authentication state.
//!
//! The bearer token and user profile obtained at login are written to a
//! JSON file (`[session].path`) so later invocations stay signed in.
//! Logout deletes the file. A session idle for longer than
//! `[session].inactivity_timeout_secs` is discarded on load, which logs
//! the user out after inactivity.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SessionConfig;
use crate::models::User;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, user: User) -> Self {
        Self {
            token,
            user,
            last_activity: Utc::now(),
        }
    }
}

/// File-backed session persistence.
pub struct SessionStore {
    path: PathBuf,
    inactivity_timeout: Duration,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>, inactivity_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            inactivity_timeout,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        let timeout = i64::try_from(config.inactivity_timeout_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::weeks(52 * 100));
        Self::new(config.path.clone(), timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved session, if any. An expired session is deleted and
    /// reported as absent.
    pub fn load(&self) -> Result<Option<Session>> {
        self.load_at(Utc::now())
    }

    fn load_at(&self, now: DateTime<Utc>) -> Result<Option<Session>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file: {}", self.path.display()))?;
        let session: Session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", self.path.display()))?;

        if now - session.last_activity > self.inactivity_timeout {
            info!(user = %session.user.username, "session expired after inactivity");
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    /// Writes the session. On unix the file is owner-only (0600), also when
    /// it already existed with wider permissions.
    pub fn save(&self, session: &Session) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(session)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict {}", self.path.display()))?;
        }
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write session file: {}", self.path.display()))?;
        Ok(())
    }

    /// Records activity now; returns the refreshed session.
    pub fn touch(&self) -> Result<Option<Session>> {
        match self.load()? {
            Some(mut session) => {
                session.last_activity = Utc::now();
                self.save(&session)?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Logs out. Returns whether a session existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove session file: {}", self.path.display()))?;
        Ok(true)
    }
}
