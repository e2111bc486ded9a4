//! The puller: walks the Forum's "last modified" listings, converts topics
//! and comments into articles, and keeps the per-group indexes consistent.
//!
//! Appending always goes through the store, inside the group's locked
//! section, so an interrupted run leaves a shorter but valid group. Expiry
//! (when enabled) runs per group before pulling.

pub mod html;
pub mod render;

use crate::article::{Article, LorId};
use crate::client::Forum;
use crate::config::GroupEntry;
use crate::error::RemoteError;
use crate::puller::html::{CommentPost, Sign, ThreadEntry, TopicPost};
use crate::puller::render::{Rendered, VOTE_LABEL};
use crate::storage::{GroupIndex, Mode, Store};
use crate::wildmat::Pattern;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use tracing::{debug, info};

/// Threads per lastmod listing page.
const PAGE_SIZE: usize = 30;

pub struct PullOptions {
    pub pattern: Option<Pattern>,
    /// Pull window in days; negative disables pulling.
    pub pull_days: i64,
    /// Expiry age in days; negative disables expiry, zero expires all.
    pub expire_days: i64,
    pub timeout: std::time::Duration,
}

/// One puller invocation over every catalog group matching the pattern.
pub async fn run(store: &Store, opts: &PullOptions) -> anyhow::Result<()> {
    let forum = Forum::anonymous(opts.timeout)?;
    run_with(store, forum, opts).await
}

/// [`run`] against an explicit client.
pub async fn run_with(store: &Store, mut forum: Forum, opts: &PullOptions) -> anyhow::Result<()> {
    for entry in store.catalog().iter() {
        if let Some(pattern) = &opts.pattern {
            if !pattern.matches(&entry.name) {
                continue;
            }
        }
        if opts.expire_days >= 0 {
            expire_group(store, &entry.name, opts.expire_days).await?;
        }
        if opts.pull_days >= 0 {
            pull_group(store, &mut forum, entry, opts.pull_days).await?;
        }
    }
    Ok(())
}

async fn expire_group(store: &Store, group: &str, days: i64) -> anyhow::Result<()> {
    let Some(mut idx) = store.open_index(group, Mode::ReadWrite).await? else {
        return Ok(());
    };
    let cutoff = if days == 0 {
        None
    } else {
        Some((Utc::now() - Duration::days(days)).timestamp())
    };
    let deleted = idx.expire(cutoff).await?;
    idx.close().await?;
    if deleted > 0 {
        info!(group, deleted, "expired articles");
    }
    Ok(())
}

async fn pull_group(
    store: &Store,
    forum: &mut Forum,
    group: &GroupEntry,
    days: i64,
) -> anyhow::Result<()> {
    let window = Duration::days(days);
    let now = Utc::now();
    let mut offset = 0usize;
    debug!(group = %group.name, "pulling");
    'walk: loop {
        let listing = forum
            .get(&format!(
                "/group-lastmod.jsp?group={}&offset={offset}",
                group.forum_id
            ))
            .await?;
        let entries = html::parse_lastmod_page(&listing)?;
        if entries.is_empty() {
            break;
        }
        let page_len = entries.len();
        for thread in &entries {
            // a clipped thread's displayed age is unreliable and never
            // ends the walk
            if !thread.clipped {
                if let Some(age) = thread
                    .age
                    .as_deref()
                    .and_then(|a| html::parse_age(a, now))
                {
                    if age > window {
                        break 'walk;
                    }
                }
            }
            pull_thread(store, forum, group, thread).await?;
        }
        if page_len < PAGE_SIZE {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(())
}

async fn pull_thread(
    store: &Store,
    forum: &mut Forum,
    group: &GroupEntry,
    thread: &ThreadEntry,
) -> anyhow::Result<()> {
    let mut idx = store.create_index(&group.name).await?;
    let stored = idx.topic_count(thread.topic).await?;
    if stored > 0 && thread.pages <= stored {
        idx.close().await?;
        return Ok(());
    }

    let mut appended = 0u64;
    let mut topic_subject = String::new();
    // the listing counts pages newest-first; walking the indexes upward
    // visits them in the forum's chronological order, so article numbers
    // assigned at append time follow the order of discovery
    for page_no in 0..thread.pages {
        let body = forum
            .get(&format!(
                "/view-message.jsp?msgid={}&page={page_no}",
                thread.topic
            ))
            .await?;
        let page = html::parse_thread_page(&body)?;
        if let Some(topic) = &page.topic {
            topic_subject = topic.subject.clone();
        }

        if page_no == 0 {
            let topic = page
                .topic
                .as_ref()
                .ok_or(RemoteError::Layout("first page without topic"))?;
            let id = LorId::topic(thread.topic);
            if !article_file_exists(&idx, &id) {
                let article = topic_article(&group.name, &id, topic);
                idx.append(&id, &article).await?;
                appended += 1;
            }
        }

        for comment in &page.comments {
            let id = LorId::comment(thread.topic, comment.id);
            if article_file_exists(&idx, &id) {
                continue;
            }
            let article = comment_article(&group.name, &id, comment, &topic_subject, idx.dir());
            idx.append(&id, &article).await?;
            appended += 1;
        }
    }

    if appended > 0 {
        info!(group = %group.name, topic = thread.topic, appended, "pulled thread");
    }
    idx.close().await?;
    Ok(())
}

fn article_file_exists(idx: &GroupIndex, id: &LorId) -> bool {
    idx.dir().join(id.location()).exists()
}

fn author_address(sign: &Sign) -> String {
    let base = format!("{} <{}@linux.org.ru>", sign.nick, sign.nick);
    if sign.banned {
        format!("{base} (banned)")
    } else {
        base
    }
}

fn header_date(sign: &Sign, now: DateTime<Utc>) -> String {
    match sign.date {
        Some(naive) => DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).to_rfc2822(),
        None => now.to_rfc2822(),
    }
}

/// The headers every emitted article carries, in emission order.
fn base_article(
    group: &str,
    id: &LorId,
    subject: &str,
    sign: &Sign,
    references: Option<String>,
    body: &Rendered,
) -> Article {
    let now = Utc::now();
    let mut article = Article {
        headers: Vec::new(),
        body: body.text.clone(),
    };
    article.push_header("Newsgroups", group);
    article.push_header("Subject", subject);
    article.push_header("From", author_address(sign));
    article.push_header("Date", header_date(sign, now));
    article.push_header("Message-ID", id.to_string());
    if let Some(refs) = references {
        article.push_header("References", refs);
    }
    article.push_header("MIME-Version", "1.0");
    article.push_header("Content-Type", "text/plain; charset=utf-8");
    article.push_header("Content-Transfer-Encoding", "8bit");
    article.push_header("Injection-Date", now.to_rfc2822());
    article.push_header("Path", "linux.org.ru!not-for-mail");
    if !sign.stars.is_empty() {
        article.push_header("X-Stars", sign.stars.clone());
    }
    if let Some(link) = &body.link {
        if link.label == VOTE_LABEL {
            article.push_header("X-Vote-URL", link.url.clone());
        } else {
            article.push_header("X-Link-URL", link.url.clone());
            article.push_header("X-Link-Text", link.label.clone());
        }
    }
    article
}

fn topic_article(group: &str, id: &LorId, topic: &TopicPost) -> Article {
    let mut article = base_article(group, id, &topic.subject, &topic.sign, None, &topic.body);
    if let Some(tags) = &topic.tags {
        article.push_header("Keywords", tags.clone());
    }
    if let Some(url) = &topic.image_url {
        article.push_header("X-Image-URL", url.clone());
    }
    if let Some(moderator) = &topic.moderator {
        article.push_header("X-Moderator", moderator.clone());
    }
    if let Some(date) = &topic.moderation_date {
        article.push_header("X-Moderation-Date", date.clone());
    }
    article
}

fn comment_article(
    group: &str,
    id: &LorId,
    comment: &CommentPost,
    topic_subject: &str,
    group_dir: &Path,
) -> Article {
    let subject = if comment.subject.is_empty() {
        format!("Re: {topic_subject}")
    } else {
        comment.subject.clone()
    };
    let references = references_for(group_dir, id.topic, comment.reply_to);
    base_article(
        group,
        id,
        &subject,
        &comment.sign,
        Some(references),
        &comment.body,
    )
}

/// The parent's References followed by the immediate parent; a first-level
/// comment references the topic alone. When the parent was never stored,
/// the chain degrades to topic-then-parent.
fn references_for(group_dir: &Path, topic: u64, reply_to: Option<u64>) -> String {
    let topic_id = LorId::topic(topic);
    let Some(parent) = reply_to else {
        return topic_id.to_string();
    };
    let parent_id = LorId::comment(topic, parent);
    let parent_path = group_dir.join(parent_id.location());
    let parent_refs = std::fs::read_to_string(&parent_path)
        .ok()
        .and_then(|text| Article::parse(&text))
        .and_then(|article| article.header("References").map(str::to_string));
    match parent_refs {
        Some(refs) => format!("{refs} {parent_id}"),
        None => format!("{topic_id} {parent_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puller::render::PromotedLink;

    fn sign() -> Sign {
        Sign {
            nick: "author".into(),
            banned: false,
            stars: "**".into(),
            date: None,
        }
    }

    #[test]
    fn topic_article_headers() {
        let topic = TopicPost {
            subject: "Subj".into(),
            sign: sign(),
            body: Rendered {
                text: "body\n".into(),
                link: Some(PromotedLink {
                    label: "Подробности".into(),
                    url: "http://example.com/".into(),
                }),
            },
            tags: Some("linux".into()),
            image_url: None,
            moderator: None,
            moderation_date: None,
        };
        let id = LorId::topic(12345);
        let article = topic_article("lor.forum.talks", &id, &topic);
        assert_eq!(article.header("Newsgroups"), Some("lor.forum.talks"));
        assert_eq!(article.header("Message-ID"), Some("<lor12345@linux.org.ru>"));
        assert_eq!(article.header("From"), Some("author <author@linux.org.ru>"));
        assert_eq!(article.header("X-Link-URL"), Some("http://example.com/"));
        assert_eq!(article.header("X-Link-Text"), Some("Подробности"));
        assert_eq!(article.header("Keywords"), Some("linux"));
        assert_eq!(article.header("X-Stars"), Some("**"));
        assert_eq!(article.header("Path"), Some("linux.org.ru!not-for-mail"));
        assert_eq!(article.header("References"), None);
    }

    #[test]
    fn vote_link_promotes_to_vote_url() {
        let topic = TopicPost {
            subject: "Poll".into(),
            sign: sign(),
            body: Rendered {
                text: "poll\n".into(),
                link: Some(PromotedLink {
                    label: VOTE_LABEL.into(),
                    url: "http://example.com/vote".into(),
                }),
            },
            tags: None,
            image_url: None,
            moderator: None,
            moderation_date: None,
        };
        let article = topic_article("g", &LorId::topic(1), &topic);
        assert_eq!(article.header("X-Vote-URL"), Some("http://example.com/vote"));
        assert_eq!(article.header("X-Link-URL"), None);
    }

    #[test]
    fn banned_author_is_marked() {
        let mut s = sign();
        s.banned = true;
        assert_eq!(
            author_address(&s),
            "author <author@linux.org.ru> (banned)"
        );
    }

    #[test]
    fn first_level_comment_references_topic() {
        let dir = tempfile::tempdir().unwrap();
        let refs = references_for(dir.path(), 12345, None);
        assert_eq!(refs, "<lor12345@linux.org.ru>");
    }

    #[test]
    fn nested_comment_extends_parent_references() {
        let dir = tempfile::tempdir().unwrap();
        let parent = Article {
            headers: vec![(
                "References".into(),
                "<lor12345@linux.org.ru>".into(),
            )],
            body: String::new(),
        };
        let parent_dir = dir.path().join("12345");
        std::fs::create_dir_all(&parent_dir).unwrap();
        std::fs::write(parent_dir.join("678"), parent.encode()).unwrap();
        let refs = references_for(dir.path(), 12345, Some(678));
        assert_eq!(
            refs,
            "<lor12345@linux.org.ru> <lor12345.678@linux.org.ru>"
        );
    }

    #[test]
    fn missing_parent_degrades_to_topic_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let refs = references_for(dir.path(), 12345, Some(999));
        assert_eq!(
            refs,
            "<lor12345@linux.org.ru> <lor12345.999@linux.org.ru>"
        );
    }
}
