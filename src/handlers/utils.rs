//! Utility functions for command handlers.

use crate::article::{Article, LorId};
use crate::error::StoreError;
use crate::responses::*;
use crate::session::Session;
use crate::storage::{Mode, Store};
use anyhow::Result;
use std::error::Error;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol-level failures of an article query; each maps to one 4xx/5xx
/// response. Store failures stay `anyhow` and end the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleQueryError {
    /// No group is currently selected.
    NoGroup,
    /// No valid current article number.
    NoCurrent,
    /// Argument is neither a number nor a message-id.
    BadArg,
    /// Article not found by number.
    NoSuchNumber,
    /// Unknown or malformed message-id.
    NoSuchId,
}

impl fmt::Display for ArticleQueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArticleQueryError::NoGroup => write!(f, "no group selected"),
            ArticleQueryError::NoCurrent => write!(f, "no current article"),
            ArticleQueryError::BadArg => write!(f, "bad argument"),
            ArticleQueryError::NoSuchNumber => write!(f, "no such article number"),
            ArticleQueryError::NoSuchId => write!(f, "no such message-id"),
        }
    }
}

impl Error for ArticleQueryError {}

pub type QueryResult<T> = std::result::Result<T, ArticleQueryError>;

/// A located article.
pub struct Resolved {
    /// Number reported on the status line; 0 for a message-id hit outside
    /// the current group.
    pub number: u64,
    pub id: LorId,
    pub article: Article,
}

/// Resolve the `[N|<message-id>]` argument of ARTICLE/HEAD/BODY/STAT.
pub async fn resolve_article(
    store: &Store,
    session: &mut Session,
    arg: Option<&str>,
) -> Result<QueryResult<Resolved>> {
    match arg {
        Some(arg) if arg.starts_with('<') => {
            let Some(id) = LorId::parse(arg) else {
                return Ok(Err(ArticleQueryError::NoSuchId));
            };
            let Some(hit) = store.find_message(&id).await? else {
                return Ok(Err(ArticleQueryError::NoSuchId));
            };
            let number = if session.current_group() == Some(hit.group.as_str()) {
                hit.number
            } else {
                0
            };
            let article = store.read_article_at(&hit.path).await?;
            Ok(Ok(Resolved {
                number,
                id,
                article,
            }))
        }
        Some(arg) => {
            if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
                return Ok(Err(ArticleQueryError::BadArg));
            }
            let n: u64 = match arg.parse() {
                Ok(n) => n,
                Err(_) => return Ok(Err(ArticleQueryError::BadArg)),
            };
            let Some(group) = session.current_group().map(str::to_string) else {
                return Ok(Err(ArticleQueryError::NoGroup));
            };
            match lookup_number(store, &group, n).await? {
                Some(resolved) => {
                    session.set_current_article(n);
                    Ok(Ok(resolved))
                }
                None => Ok(Err(ArticleQueryError::NoSuchNumber)),
            }
        }
        None => {
            let Some(group) = session.current_group().map(str::to_string) else {
                return Ok(Err(ArticleQueryError::NoGroup));
            };
            let Some(n) = session.current_article() else {
                return Ok(Err(ArticleQueryError::NoCurrent));
            };
            match lookup_number(store, &group, n).await? {
                Some(resolved) => Ok(Ok(resolved)),
                None => Ok(Err(ArticleQueryError::NoCurrent)),
            }
        }
    }
}

async fn lookup_number(store: &Store, group: &str, n: u64) -> Result<Option<Resolved>> {
    let Some(mut idx) = store.open_index(group, Mode::Read).await? else {
        return Ok(None);
    };
    let location = idx.article_location(n).await?;
    let path = location.as_ref().map(|loc| idx.dir().join(loc));
    idx.close().await?;
    let (Some(location), Some(path)) = (location, path) else {
        return Ok(None);
    };
    let id = LorId::from_location(&location).ok_or_else(|| StoreError::BrokenIndex {
        path: store.config().group_dir(group).join("index"),
    })?;
    let article = store.read_article_at(&path).await?;
    Ok(Some(Resolved {
        number: n,
        id,
        article,
    }))
}

/// Map a query error to its response line.
pub async fn handle_article_error<W: AsyncWrite + Unpin>(
    writer: &mut W,
    error: ArticleQueryError,
) -> Result<()> {
    let resp = match error {
        ArticleQueryError::NoGroup => RESP_412_NO_GROUP,
        ArticleQueryError::NoCurrent => RESP_420_NO_CURRENT,
        ArticleQueryError::BadArg => RESP_501_SYNTAX,
        ArticleQueryError::NoSuchNumber => RESP_423_NO_ARTICLE_NUM,
        ArticleQueryError::NoSuchId => RESP_430_NO_ARTICLE,
    };
    write_simple(writer, resp).await
}

/// Write a simple response line to the writer.
pub async fn write_simple<W: AsyncWrite + Unpin>(writer: &mut W, response: &str) -> Result<()> {
    writer.write_all(response.as_bytes()).await?;
    Ok(())
}

/// Send article headers to the writer, CRLF line endings.
pub async fn send_headers<W: AsyncWrite + Unpin>(writer: &mut W, article: &Article) -> Result<()> {
    for (name, val) in &article.headers {
        writer.write_all(name.as_bytes()).await?;
        writer.write_all(b": ").await?;
        writer.write_all(val.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }
    Ok(())
}

/// Send an article body with dot-stuffing applied.
pub async fn send_body<W: AsyncWrite + Unpin>(writer: &mut W, body: &str) -> Result<()> {
    for line in body.lines() {
        if line.starts_with('.') {
            writer.write_all(b".").await?;
        }
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }
    Ok(())
}

/// Read a message until the lone-dot terminator, undoing dot-stuffing and
/// rewriting line endings to LF.
pub async fn read_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<String> {
    let mut msg = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            anyhow::bail!("connection closed before end of article");
        }
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "." {
            break;
        }
        let unstuffed = trimmed.strip_prefix('.').unwrap_or(trimmed);
        msg.push_str(unstuffed);
        msg.push('\n');
    }
    Ok(msg)
}
