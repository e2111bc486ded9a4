//! The persistent per-user cookie jar.
//!
//! The Forum session rides on cookies, so the jar outlives the process: it
//! is loaded from `<user>/cookies` and re-saved after every response that
//! sets one. Session cookies survive process exit: the `Discard` attribute
//! is ignored. The poster inspects expiry times to decide whether a fresh
//! login is needed before a submission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    /// Expiry as Unix seconds; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    /// Load a jar. A missing or unreadable file yields an empty jar; the
    /// next login repopulates it.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(jar) => jar,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "discarding unreadable cookie jar");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the jar with user-only permissions, creating the parent
    /// directory as needed.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, text)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    /// Absorb one `Set-Cookie` header value, replacing any cookie of the
    /// same name. Unparseable headers are ignored.
    pub fn store(&mut self, set_cookie: &str) {
        let Some(cookie) = parse_set_cookie(set_cookie) else {
            return;
        };
        self.cookies.retain(|c| c.name != cookie.name);
        self.cookies.push(cookie);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// The `Cookie:` request header for the cookies still alive at `now`,
    /// or `None` when there is nothing to send.
    #[must_use]
    pub fn header_value(&self, now: DateTime<Utc>) -> Option<String> {
        let alive: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| c.expires.is_none_or(|t| t > now.timestamp()))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if alive.is_empty() {
            None
        } else {
            Some(alive.join("; "))
        }
    }

    /// True when any cookie expires within `secs` of `now`, meaning the
    /// session token could die before a submission completes.
    #[must_use]
    pub fn expires_within(&self, secs: u64, now: DateTime<Utc>) -> bool {
        let deadline = now.timestamp() + secs as i64;
        self.cookies
            .iter()
            .any(|c| c.expires.is_some_and(|t| t <= deadline))
    }
}

fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    if name.is_empty() {
        return None;
    }
    let mut cookie = Cookie {
        name: name.trim().to_string(),
        value: value.trim().to_string(),
        domain: None,
        path: None,
        expires: None,
    };
    let mut max_age = None;
    for attr in parts {
        let attr = attr.trim();
        let (key, val) = attr.split_once('=').unwrap_or((attr, ""));
        match key.to_ascii_lowercase().as_str() {
            "domain" => cookie.domain = Some(val.trim().to_string()),
            "path" => cookie.path = Some(val.trim().to_string()),
            "expires" => {
                if let Ok(when) = DateTime::parse_from_rfc2822(val.trim()) {
                    cookie.expires = Some(when.timestamp());
                }
            }
            "max-age" => max_age = val.trim().parse::<i64>().ok(),
            // `discard`, `secure`, `httponly` and friends are irrelevant
            // to a jar that must outlive the process
            _ => {}
        }
    }
    if let Some(secs) = max_age {
        cookie.expires = Some(Utc::now().timestamp() + secs);
    }
    Some(cookie)
}
