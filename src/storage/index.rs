//! The locked per-group index.
//!
//! Each group directory carries a small SQLite file `index` holding a single
//! key/value table, plus an `index.lock` file. The advisory lock protocol is
//! what the three programs actually share: the exclusive `flock` is taken
//! *before* the index is opened and held until the handle drops, for readers
//! and writers alike.
//!
//! Key families:
//!
//! | key        | value                       |
//! |------------|-----------------------------|
//! | `count`    | live article numbers        |
//! | `min`      | lowest live number (`max+1` when empty) |
//! | `max`      | highest number ever assigned |
//! | `{N}`      | `{TOPIC}/{COMMENT}` file location |
//! | `+{N}`     | injection time, Unix seconds |
//! | `:{N}`     | overview record             |
//! | `{TOPIC}/` | live articles in that topic |
//!
//! The raw key strings never leave this module; callers go through the typed
//! accessors.

use crate::article::{Article, LorId};
use crate::error::StoreError;
use crate::overview::{OVERVIEW_FORMAT, overview_record};
use crate::parse::Range;
use chrono::Utc;
use nix::fcntl::{Flock, FlockArg};
use nix::sys::signal::{SigSet, SigmaskHow, Signal, sigprocmask};
use sqlx::{ConnectOptions, Connection, Row, SqliteConnection, sqlite::SqliteConnectOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

const KV_TABLE: &str = "CREATE TABLE IF NOT EXISTS kv (
        k TEXT PRIMARY KEY,
        v TEXT NOT NULL
    )";

/// A `count`/`min`/`max` value must be a plain run of digits.
fn parse_counter(value: Option<String>, index_path: &Path) -> Result<u64, StoreError> {
    let broken = || StoreError::BrokenIndex {
        path: index_path.to_path_buf(),
    };
    let value = value.ok_or_else(broken)?;
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(broken());
    }
    value.parse().map_err(|_| broken())
}

/// How a group index is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Read-only; the index must already exist.
    Read,
    /// Read/write; the index must already exist.
    ReadWrite,
    /// Read/write, creating the group directory and a fresh empty index.
    Create,
}

/// The `{count, min, max}` triple of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupStatus {
    pub count: u64,
    pub min: u64,
    pub max: u64,
}

impl GroupStatus {
    /// The view of a group that has never been pulled.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            count: 0,
            min: 1,
            max: 0,
        }
    }
}

/// Blocks the interactive-interrupt signal for the lifetime of the guard so
/// a write transaction cannot be torn between the article file and the
/// index. Writers run on a current-thread runtime, where the thread mask
/// covers the whole transaction.
struct InterruptGuard {
    set: SigSet,
}

impl InterruptGuard {
    fn new() -> Self {
        let mut set = SigSet::empty();
        set.add(Signal::SIGINT);
        let _ = sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), None);
        Self { set }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let _ = sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&self.set), None);
    }
}

/// An open, locked, invariant-checked handle to one group's index.
pub struct GroupIndex {
    group: String,
    dir: PathBuf,
    conn: SqliteConnection,
    _lock: Flock<File>,
    count: u64,
    min: u64,
    max: u64,
}

impl GroupIndex {
    /// Lock and open the index under `dir`. Returns `Ok(None)` when the
    /// index does not exist and `mode` does not create.
    pub async fn open(group: &str, dir: &Path, mode: Mode) -> Result<Option<Self>, StoreError> {
        let index_path = dir.join("index");
        if mode != Mode::Create && !index_path.exists() {
            return Ok(None);
        }
        if mode == Mode::Create {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        // Exclusive advisory lock, taken before the index itself is opened.
        let lock_path = dir.join("index.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Io {
                path: lock_path.clone(),
                source,
            })?;
        let lock = {
            let lock_path = lock_path.clone();
            tokio::task::spawn_blocking(move || Flock::lock(lock_file, FlockArg::LockExclusive))
                .await
                .map_err(|e| StoreError::Io {
                    path: lock_path.clone(),
                    source: std::io::Error::other(e),
                })?
                .map_err(|(_, errno)| StoreError::Lock {
                    path: lock_path,
                    errno,
                })?
        };

        let fresh = mode == Mode::Create && !index_path.exists();
        let options = SqliteConnectOptions::new()
            .filename(&index_path)
            .create_if_missing(mode == Mode::Create)
            .read_only(mode == Mode::Read);
        let conn = options
            .connect()
            .await
            .map_err(|source| StoreError::Index {
                path: index_path.clone(),
                source,
            })?;

        let mut idx = Self {
            group: group.to_string(),
            dir: dir.to_path_buf(),
            conn,
            _lock: lock,
            count: 0,
            min: 1,
            max: 0,
        };

        if fresh {
            idx.exec(KV_TABLE).await?;
            idx.put("count", "0").await?;
            idx.put("min", "1").await?;
            idx.put("max", "0").await?;
        } else {
            idx.load_status().await?;
        }
        Ok(Some(idx))
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn status(&self) -> GroupStatus {
        GroupStatus {
            count: self.count,
            min: self.min,
            max: self.max,
        }
    }

    /// Read and re-validate `count`/`min`/`max`.
    async fn load_status(&mut self) -> Result<(), StoreError> {
        let index_path = self.dir.join("index");
        let count = parse_counter(self.get("count").await?, &index_path)?;
        let min = parse_counter(self.get("min").await?, &index_path)?;
        let max = parse_counter(self.get("max").await?, &index_path)?;
        let span_ok = if count > 0 {
            min >= 1 && max >= min && max - min + 1 >= count
        } else {
            min == max + 1
        };
        if !span_ok {
            return Err(StoreError::BrokenIndex { path: index_path });
        }
        self.count = count;
        self.min = min;
        self.max = max;
        Ok(())
    }

    /// The `{TOPIC}/{COMMENT}` location of a live article number.
    pub async fn article_location(&mut self, n: u64) -> Result<Option<String>, StoreError> {
        self.get(&n.to_string()).await
    }

    /// Absolute path of a live article number's file.
    pub async fn article_path(&mut self, n: u64) -> Result<Option<PathBuf>, StoreError> {
        Ok(self.article_location(n).await?.map(|loc| self.dir.join(loc)))
    }

    /// Injection time of a live article number, Unix seconds.
    pub async fn timestamp(&mut self, n: u64) -> Result<Option<i64>, StoreError> {
        match self.get(&format!("+{n}")).await? {
            None => Ok(None),
            Some(v) => v.parse().map(Some).map_err(|_| StoreError::BrokenIndex {
                path: self.dir.join("index"),
            }),
        }
    }

    /// Stored overview record of a live article number. A record with the
    /// wrong field count is store corruption, not something to hand to a
    /// client.
    pub async fn overview(&mut self, n: u64) -> Result<Option<String>, StoreError> {
        let Some(record) = self.get(&format!(":{n}")).await? else {
            return Ok(None);
        };
        if record.split('\t').count() != OVERVIEW_FORMAT.len() {
            return Err(StoreError::CorruptOverview {
                path: self.dir.join("index"),
                number: n,
            });
        }
        Ok(Some(record))
    }

    /// Live articles under a topic; 0 when the topic is unknown.
    pub async fn topic_count(&mut self, topic: u64) -> Result<u64, StoreError> {
        match self.get(&format!("{topic}/")).await? {
            None => Ok(0),
            Some(v) => v.parse().map_err(|_| StoreError::BrokenIndex {
                path: self.dir.join("index"),
            }),
        }
    }

    /// Live article numbers within `range` (all of them when `None`), in
    /// ascending order.
    pub async fn scan(&mut self, range: Option<Range>) -> Result<Vec<u64>, StoreError> {
        if self.count == 0 {
            return Ok(Vec::new());
        }
        let lo = range.map_or(self.min, |r| r.lo.max(self.min));
        let hi = range
            .and_then(|r| r.hi)
            .map_or(self.max, |h| h.min(self.max));
        let mut live = Vec::new();
        let mut n = lo;
        while n <= hi {
            if self.article_location(n).await?.is_some() {
                live.push(n);
            }
            n += 1;
        }
        Ok(live)
    }

    /// The closest live number strictly after `n`.
    pub async fn next_after(&mut self, n: u64) -> Result<Option<u64>, StoreError> {
        let mut m = n.saturating_add(1);
        while m <= self.max {
            if self.article_location(m).await?.is_some() {
                return Ok(Some(m));
            }
            m += 1;
        }
        Ok(None)
    }

    /// The closest live number strictly before `n`.
    pub async fn prev_before(&mut self, n: u64) -> Result<Option<u64>, StoreError> {
        let mut m = n;
        while m > self.min {
            m -= 1;
            if self.article_location(m).await?.is_some() {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    /// Append one article: write its file and register it under the next
    /// article number, all in the current locked section.
    pub async fn append(&mut self, id: &LorId, article: &Article) -> Result<u64, StoreError> {
        self.append_with_time(id, article, Utc::now().timestamp())
            .await
    }

    /// [`append`](Self::append) with an explicit injection time, for tools
    /// that need to backdate (expiry keys off this timestamp).
    pub async fn append_with_time(
        &mut self,
        id: &LorId,
        article: &Article,
        injected_at: i64,
    ) -> Result<u64, StoreError> {
        let _guard = InterruptGuard::new();

        let topic_dir = self.dir.join(id.topic.to_string());
        std::fs::create_dir_all(&topic_dir).map_err(|source| StoreError::Io {
            path: topic_dir.clone(),
            source,
        })?;
        let file = topic_dir.join(id.comment.unwrap_or(0).to_string());
        std::fs::write(&file, article.encode()).map_err(|source| StoreError::Io {
            path: file.clone(),
            source,
        })?;

        let n = self.max + 1;
        self.put(&n.to_string(), &id.location()).await?;
        self.put(&format!("+{n}"), &injected_at.to_string()).await?;
        self.put(&format!(":{n}"), &overview_record(article)).await?;
        let topics = self.topic_count(id.topic).await?;
        self.put(&format!("{}/", id.topic), &(topics + 1).to_string())
            .await?;

        self.max = n;
        self.count += 1;
        self.put("max", &self.max.to_string()).await?;
        self.put("count", &self.count.to_string()).await?;
        Ok(n)
    }

    /// Remove articles older than `cutoff` (Unix seconds; `None` removes
    /// unconditionally), walking up from `min` and stopping at the first
    /// newer live article. Returns the number of deleted articles.
    pub async fn expire(&mut self, cutoff: Option<i64>) -> Result<u64, StoreError> {
        let _guard = InterruptGuard::new();

        let mut deleted = 0u64;
        let mut n = self.min;
        let mut new_min = None;
        while n <= self.max {
            let Some(loc) = self.article_location(n).await? else {
                n += 1;
                continue;
            };
            let fresh = match cutoff {
                None => false,
                Some(c) => self.timestamp(n).await?.is_some_and(|t| t >= c),
            };
            if fresh {
                new_min = Some(n);
                break;
            }

            let file = self.dir.join(&loc);
            if let Err(e) = std::fs::remove_file(&file) {
                warn!(file = %file.display(), error = %e, "cannot remove expired article");
            }
            self.del(&n.to_string()).await?;
            self.del(&format!("+{n}")).await?;
            self.del(&format!(":{n}")).await?;

            if let Some((topic, _)) = loc.split_once('/') {
                let topic_key = format!("{topic}/");
                let left = match self.get(&topic_key).await? {
                    Some(v) => v.parse::<u64>().unwrap_or(1).saturating_sub(1),
                    None => 0,
                };
                if left == 0 {
                    self.del(&topic_key).await?;
                    let _ = std::fs::remove_dir(self.dir.join(topic));
                } else {
                    self.put(&topic_key, &left.to_string()).await?;
                }
            }

            self.count -= 1;
            deleted += 1;
            n += 1;
        }

        self.min = new_min.unwrap_or(self.max + 1);
        self.put("min", &self.min.to_string()).await?;
        self.put("count", &self.count.to_string()).await?;
        Ok(deleted)
    }

    /// Close the handle, releasing the lock.
    pub async fn close(self) -> Result<(), StoreError> {
        let path = self.dir.join("index");
        self.conn
            .close()
            .await
            .map_err(|source| StoreError::Index { path, source })
    }

    async fn exec(&mut self, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                let path = self.dir.join("index");
                StoreError::Index { path, source: e }
            })
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT v FROM kv WHERE k = ?")
            .bind(key)
            .fetch_optional(&mut self.conn)
            .await
            .map_err(|e| {
                let path = self.dir.join("index");
                StoreError::Index { path, source: e }
            })?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO kv (k, v) VALUES (?, ?) ON CONFLICT(k) DO UPDATE SET v = excluded.v")
            .bind(key)
            .bind(value)
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                let path = self.dir.join("index");
                StoreError::Index { path, source: e }
            })
    }

    async fn del(&mut self, key: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM kv WHERE k = ?")
            .bind(key)
            .execute(&mut self.conn)
            .await
            .map(|_| ())
            .map_err(|e| {
                let path = self.dir.join("index");
                StoreError::Index { path, source: e }
            })
    }
}
