//! Store root resolution and the installation's static files.
//!
//! Everything lornews persists lives under `$HOME/.lornews`:
//!
//! ```text
//! groups                newsgroup catalog, one `<name> <id> <description>` per line
//! cdate                 catalog creation date, YYYYMMDDhhmmss UTC
//! users/<nick>/passwd   cleartext password
//! users/<nick>/cookies  persistent cookie jar
//! news/...              per-group indexes and article files
//! ```
//!
//! The catalog is authoritative: only groups listed in it exist.

use crate::error::ConfigError;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::path::{Path, PathBuf};

pub const STORE_DIR: &str = ".lornews";

/// Characters that may not appear in a newsgroup name. Wildcard characters
/// are excluded so catalog names can never collide with pattern syntax.
fn valid_group_name(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| {
            !c.is_whitespace() && !matches!(c, ',' | '[' | ']' | '\\' | '*' | '?' | '!')
        })
}

/// One catalog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    /// The Forum's numeric section id, used by group-lastmod.jsp and add.jsp.
    pub forum_id: u64,
    pub description: String,
}

/// The newsgroup catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<GroupEntry>,
}

impl Catalog {
    /// Parse the catalog file contents. `path` is only used for diagnostics.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || ConfigError::BadCatalogLine {
                path: path.to_path_buf(),
                line: idx + 1,
            };
            let mut parts = line.splitn(3, char::is_whitespace);
            let name = parts.next().ok_or_else(bad)?;
            let id = parts.next().ok_or_else(bad)?;
            let description = parts.next().unwrap_or("").trim().to_string();
            if !valid_group_name(name) {
                return Err(bad());
            }
            let forum_id = id.parse().map_err(|_| bad())?;
            entries.push(GroupEntry {
                name: name.to_string(),
                forum_id,
                description,
            });
        }
        Ok(Self { entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&GroupEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Paths of one installation.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
}

impl Config {
    /// Resolve the store root from `$HOME`. Its absence is fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::MissingHome)?;
        Ok(Self {
            root: PathBuf::from(home).join(STORE_DIR),
        })
    }

    /// Use an explicit root instead of `$HOME/.lornews`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.root.join("groups")
    }

    pub fn cdate_path(&self) -> PathBuf {
        self.root.join("cdate")
    }

    pub fn news_dir(&self) -> PathBuf {
        self.root.join("news")
    }

    /// Article directory of a group: the dot-split group name under news/.
    pub fn group_dir(&self, group: &str) -> PathBuf {
        let mut dir = self.news_dir();
        for part in group.split('.') {
            dir.push(part);
        }
        dir
    }

    pub fn user_dir(&self, nick: &str) -> PathBuf {
        self.root.join("users").join(nick)
    }

    pub fn passwd_path(&self, nick: &str) -> PathBuf {
        self.user_dir(nick).join("passwd")
    }

    pub fn cookies_path(&self, nick: &str) -> PathBuf {
        self.user_dir(nick).join("cookies")
    }

    pub fn load_catalog(&self) -> Result<Catalog, ConfigError> {
        let path = self.catalog_path();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        Catalog::parse(&text, &path)
    }

    /// The persisted "when was this install's catalog created" timestamp,
    /// stored as YYYYMMDDhhmmss in UTC. NEWGROUPS gates on it.
    pub fn load_creation_date(&self) -> Result<DateTime<Utc>, ConfigError> {
        let path = self.cdate_path();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let naive = NaiveDateTime::parse_from_str(text.trim(), "%Y%m%d%H%M%S")
            .map_err(|_| ConfigError::BadCreationDate { path: path.clone() })?;
        Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
    }

    pub fn load_password(&self, nick: &str) -> Result<String, ConfigError> {
        let path = self.passwd_path(nick);
        let text = std::fs::read_to_string(&path)
            .map_err(|_| ConfigError::MissingPassword(nick.to_string()))?;
        Ok(text.trim_end_matches(['\r', '\n']).to_string())
    }
}
