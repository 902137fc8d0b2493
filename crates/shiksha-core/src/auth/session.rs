use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// Sessions are dropped locally after this many days without a fresh login.
const SESSION_LIFETIME_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub contact: String,
    pub redirect: String,
    #[serde(default)]
    pub new_user: bool,
    pub created_at: DateTime<Utc>,
    /// `Cookie` header value the server set on login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
}

impl SessionData {
    pub fn new(contact: impl Into<String>, redirect: impl Into<String>, new_user: bool) -> Self {
        Self {
            contact: contact.into(),
            redirect: redirect.into(),
            new_user,
            created_at: Utc::now(),
            cookie: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.created_at + Duration::days(SESSION_LIFETIME_DAYS)
    }

    /// Days left before the local session lapses (for display)
    pub fn days_until_expiry(&self) -> i64 {
        (self.created_at + Duration::days(SESSION_LIFETIME_DAYS) - Utc::now())
            .num_days()
            .max(0)
    }
}

pub struct Session {
    data_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir, data: None }
    }

    /// Load session from disk. Returns whether a live session was found.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
            let data: SessionData =
                serde_json::from_str(&contents).context("Failed to parse session file")?;

            if !data.is_expired() {
                self.data = Some(data);
                return Ok(true);
            }
            debug!("Stored session expired");
        }
        Ok(false)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents).context("Failed to write session file")?;
        }
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn contact(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.contact.as_str())
    }

    pub fn is_valid(&self) -> bool {
        self.data.as_ref().map(|d| !d.is_expired()).unwrap_or(false)
    }

    /// Remember the cookies the jar holds for `url`.
    pub fn capture_cookie(&mut self, jar: &Jar, url: &Url) {
        if let Some(data) = self.data.as_mut() {
            data.cookie = jar
                .cookies(url)
                .and_then(|value| value.to_str().ok().map(str::to_string));
        }
    }

    /// Put saved cookies back into `jar` so requests stay authorized.
    pub fn restore_cookie(&self, jar: &Jar, url: &Url) {
        let Some(cookie) = self.data.as_ref().and_then(|d| d.cookie.as_deref()) else {
            return;
        };
        for pair in cookie.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            jar.add_cookie_str(pair, url);
        }
        debug!("Session cookie restored");
    }

    fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        assert!(!session.load().expect("load empty"));

        session.update(SessionData::new("9876543210", "/student/dashboard", false));
        session.save().expect("save");

        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(reloaded.load().expect("load"));
        assert_eq!(reloaded.contact(), Some("9876543210"));
        assert!(reloaded.is_valid());

        reloaded.clear().expect("clear");
        assert!(!Session::new(dir.path().to_path_buf()).load().expect("load cleared"));
    }

    #[test]
    fn test_expired_session_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut data = SessionData::new("a@b.com", "/registration", true);
        data.created_at = Utc::now() - Duration::days(SESSION_LIFETIME_DAYS + 1);
        assert!(data.is_expired());
        assert_eq!(data.days_until_expiry(), 0);

        let mut session = Session::new(dir.path().to_path_buf());
        session.update(data);
        session.save().expect("save");
        let mut reloaded = Session::new(dir.path().to_path_buf());
        assert!(!reloaded.load().expect("load"));
    }

    #[test]
    fn test_cookie_round_trip_through_jar() {
        let url = Url::parse("https://shiksha.test/api/").expect("url");
        let jar = Jar::default();
        jar.add_cookie_str("session=abc123; Path=/", &url);

        let mut session = Session::new(PathBuf::from("unused"));
        session.update(SessionData::new("a@b.com", "/student/dashboard", false));
        session.capture_cookie(&jar, &url);
        assert_eq!(session.data.as_ref().and_then(|d| d.cookie.as_deref()), Some("session=abc123"));

        let fresh = Jar::default();
        session.restore_cookie(&fresh, &url);
        let restored = fresh.cookies(&url).expect("cookie restored");
        assert_eq!(restored.to_str().expect("ascii"), "session=abc123");
    }
}
