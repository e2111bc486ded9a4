//! The shared on-disk article store.
//!
//! ```text
//! <root>/news/<g1>/<g2>/.../index       per-group key/value index
//! <root>/news/<g1>/<g2>/.../index.lock  advisory lock
//! <root>/news/<g1>/.../<TOPIC>/<N>      article files, LF on disk
//! ```
//!
//! The puller writes, the server reads, and both go through [`GroupIndex`]
//! so every access happens under the group's advisory lock.

pub mod index;

pub use index::{GroupIndex, GroupStatus, Mode};

use crate::article::{Article, LorId};
use crate::config::{Catalog, Config};
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Where a message-ID lookup found its article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHit {
    pub group: String,
    pub number: u64,
    pub path: PathBuf,
}

/// Handle to one installation's store: root paths, catalog, creation date.
#[derive(Debug, Clone)]
pub struct Store {
    config: Config,
    catalog: Catalog,
    creation_date: DateTime<Utc>,
}

impl Store {
    /// Load the catalog and creation date. Both are required; their absence
    /// is a fatal configuration error.
    pub fn open(config: Config) -> Result<Self, crate::error::ConfigError> {
        let catalog = config.load_catalog()?;
        let creation_date = config.load_creation_date()?;
        Ok(Self {
            config,
            catalog,
            creation_date,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn creation_date(&self) -> DateTime<Utc> {
        self.creation_date
    }

    /// Open a group's index. `Ok(None)` means the group exists in the
    /// catalog but has never been pulled (non-create modes only).
    pub async fn open_index(
        &self,
        group: &str,
        mode: Mode,
    ) -> Result<Option<GroupIndex>, StoreError> {
        let dir = self.config.group_dir(group);
        GroupIndex::open(group, &dir, mode).await
    }

    /// Open a group's index read/write, creating directories and a fresh
    /// empty index on first pull.
    pub async fn create_index(&self, group: &str) -> Result<GroupIndex, StoreError> {
        let dir = self.config.group_dir(group);
        match GroupIndex::open(group, &dir, Mode::Create).await? {
            Some(idx) => Ok(idx),
            None => Err(StoreError::Io {
                path: dir,
                source: std::io::Error::other("index disappeared while opening"),
            }),
        }
    }

    /// The `{count, min, max}` triple, treating a never-pulled group as
    /// empty.
    pub async fn group_status(&self, group: &str) -> Result<GroupStatus, StoreError> {
        match self.open_index(group, Mode::Read).await? {
            Some(idx) => {
                let status = idx.status();
                idx.close().await?;
                Ok(status)
            }
            None => Ok(GroupStatus::empty()),
        }
    }

    /// Read and parse the article file at `path`.
    pub async fn read_article_at(&self, path: &Path) -> Result<Article, StoreError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Article::parse(&text).ok_or_else(|| StoreError::BadArticle {
            path: path.to_path_buf(),
        })
    }

    /// Catalog-ordered scan of every group's index for the article with
    /// this message-ID. Linear, which is fine at the scale of one Forum
    /// install.
    pub async fn find_message(&self, id: &LorId) -> Result<Option<MessageHit>, StoreError> {
        let needle = id.location();
        for entry in self.catalog.iter() {
            let Some(mut idx) = self.open_index(&entry.name, Mode::Read).await? else {
                continue;
            };
            let status = idx.status();
            let mut n = status.min;
            let mut hit = None;
            while n <= status.max {
                if let Some(loc) = idx.article_location(n).await? {
                    if loc == needle {
                        hit = Some(MessageHit {
                            group: entry.name.clone(),
                            number: n,
                            path: idx.dir().join(&loc),
                        });
                        break;
                    }
                }
                n += 1;
            }
            idx.close().await?;
            if hit.is_some() {
                return Ok(hit);
            }
        }
        Ok(None)
    }
}
