//! The one seam bound to the Forum's markup.
//!
//! Everything the puller knows about HTML lives here, behind two capability
//! functions: [`parse_lastmod_page`] for the "last modified" thread listing
//! and [`parse_thread_page`] for a topic page with its comments. When the
//! Forum changes its layout, this module is the only place to update; both
//! functions fail with the schema-drift error rather than guessing.
//!
//! Expected shapes:
//!
//! ```html
//! <!-- group-lastmod.jsp -->
//! <tr>
//!   <td><a href="view-message.jsp?msgid=12345">Subject</a>
//!       <a href="view-message.jsp?msgid=12345&page=1">2</a>
//!       <img class="clip" src="/img/clip.gif"></td>
//!   <td class="dateinterval">3 часа назад</td>
//! </tr>
//!
//! <!-- view-message.jsp -->
//! <div class="msg" id="topic-12345">
//!   <h1>Subject</h1>
//!   <div class="tags">linux, kernel</div>
//!   <div class="msgtext">...</div>
//!   <div class="sign"><a href="/whois.jsp?nick=user">user</a>
//!        <span class="stars">**</span> (01.08.2026 10:20:30)</div>
//!   <div class="moderation">mod (01.08.2026 11:00:00)</div>
//! </div>
//! <div class="msg" id="comment-678">
//!   <div class="title">Re: Subject</div>
//!   <div class="reply"><a href="view-message.jsp?msgid=12345&cid=555">Ответ на</a></div>
//!   <div class="msgtext">...</div>
//!   <div class="sign">...</div>
//! </div>
//! ```

use super::render::{Rendered, render_element};
use crate::error::RemoteError;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

/// One row of the lastmod listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadEntry {
    pub topic: u64,
    /// Rendered comment-page count, at least 1.
    pub pages: u64,
    /// Clipped threads carry an unreliable age and must never terminate
    /// the walk.
    pub clipped: bool,
    pub age: Option<String>,
}

/// Author block shared by topics and comments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sign {
    pub nick: String,
    pub banned: bool,
    pub stars: String,
    pub date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPost {
    pub subject: String,
    pub sign: Sign,
    pub body: Rendered,
    pub tags: Option<String>,
    pub image_url: Option<String>,
    pub moderator: Option<String>,
    pub moderation_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPost {
    pub id: u64,
    pub subject: String,
    pub sign: Sign,
    /// Comment id of the immediate parent; `None` for first-level replies.
    pub reply_to: Option<u64>,
    pub body: Rendered,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPage {
    pub topic: Option<TopicPost>,
    pub comments: Vec<CommentPost>,
}

struct Selectors {
    row: Selector,
    link: Selector,
    img: Selector,
    interval: Selector,
    msg: Selector,
    h1: Selector,
    title: Selector,
    msgtext: Selector,
    tags: Selector,
    sign: Selector,
    whois: Selector,
    stars: Selector,
    moderation: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let sel = |s: &str| Selector::parse(s).expect("static selector");
        Selectors {
            row: sel("tr"),
            link: sel("a[href]"),
            img: sel("img"),
            interval: sel(".dateinterval"),
            msg: sel("div.msg"),
            h1: sel("h1"),
            title: sel("div.title"),
            msgtext: sel("div.msgtext"),
            tags: sel("div.tags"),
            sign: sel("div.sign"),
            whois: sel("a[href*=\"whois.jsp\"]"),
            stars: sel("span.stars"),
            moderation: sel("div.moderation"),
        }
    })
}

/// Extract one query parameter out of an href.
fn query_param(href: &str, name: &str) -> Option<String> {
    let (_, query) = href.split_once('?')?;
    let query = query.split_once('#').map_or(query, |(q, _)| q);
    for pair in query.split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == name {
                return Some(v.to_string());
            }
        }
    }
    None
}

fn collapsed_text(el: ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a `group-lastmod.jsp` page into thread entries, in page order.
/// An empty listing is a normal end of the walk, not drift.
pub fn parse_lastmod_page(html: &str) -> Result<Vec<ThreadEntry>, RemoteError> {
    let sel = selectors();
    let doc = Html::parse_document(html);
    let mut entries = Vec::new();
    for row in doc.select(&sel.row) {
        let mut topic = None;
        let mut pages = 1u64;
        for link in row.select(&sel.link) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            if !href.contains("view-message.jsp") {
                continue;
            }
            let Some(msgid) = query_param(href, "msgid").and_then(|v| v.parse::<u64>().ok())
            else {
                return Err(RemoteError::Layout("thread link without msgid"));
            };
            let topic = *topic.get_or_insert(msgid);
            if topic != msgid {
                return Err(RemoteError::Layout("listing row spans two threads"));
            }
            if let Some(page) = query_param(href, "page").and_then(|v| v.parse::<u64>().ok()) {
                pages = pages.max(page + 1);
            }
        }
        let Some(topic) = topic else {
            continue;
        };
        let clipped = row.select(&sel.img).any(|img| {
            img.value().attr("src").is_some_and(|s| s.contains("clip"))
                || img.value().attr("class").is_some_and(|c| c.contains("clip"))
        });
        let age = row
            .select(&sel.interval)
            .next()
            .map(collapsed_text)
            .filter(|s| !s.is_empty());
        entries.push(ThreadEntry {
            topic,
            pages,
            clipped,
            age,
        });
    }
    Ok(entries)
}

/// Parse one `view-message.jsp` page. The topic block is present on every
/// page; comments are whatever the page shows.
pub fn parse_thread_page(html: &str) -> Result<ThreadPage, RemoteError> {
    let sel = selectors();
    let doc = Html::parse_document(html);
    let mut page = ThreadPage::default();
    let mut saw_msg = false;

    for msg in doc.select(&sel.msg) {
        saw_msg = true;
        let id = msg.value().attr("id").unwrap_or("");
        if id.starts_with("topic-") {
            page.topic = Some(parse_topic(msg)?);
        } else if let Some(comment) = id.strip_prefix("comment-") {
            let comment_id = comment
                .parse()
                .map_err(|_| RemoteError::Layout("non-numeric comment id"))?;
            page.comments.push(parse_comment(msg, comment_id)?);
        }
    }

    if !saw_msg {
        return Err(RemoteError::Layout("no message blocks on thread page"));
    }
    Ok(page)
}

fn parse_topic(msg: ElementRef) -> Result<TopicPost, RemoteError> {
    let sel = selectors();
    let subject = msg
        .select(&sel.h1)
        .next()
        .map(collapsed_text)
        .ok_or(RemoteError::Layout("topic without subject"))?;
    let body_el = msg
        .select(&sel.msgtext)
        .next()
        .ok_or(RemoteError::Layout("topic without body"))?;
    let image_url = body_el
        .select(&sel.img)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::to_string);
    let tags = msg
        .select(&sel.tags)
        .next()
        .map(collapsed_text)
        .filter(|t| !t.is_empty());
    let (moderator, moderation_date) = match msg.select(&sel.moderation).next() {
        Some(el) => split_sign_date(&collapsed_text(el)),
        None => (None, None),
    };
    Ok(TopicPost {
        subject,
        sign: parse_sign(msg)?,
        body: render_element(body_el),
        tags,
        image_url,
        moderator,
        moderation_date,
    })
}

fn parse_comment(msg: ElementRef, id: u64) -> Result<CommentPost, RemoteError> {
    let sel = selectors();
    let subject = msg
        .select(&sel.title)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();
    let body_el = msg
        .select(&sel.msgtext)
        .next()
        .ok_or(RemoteError::Layout("comment without body"))?;
    let reply_to = msg.select(&sel.link).find_map(|link| {
        let href = link.value().attr("href")?;
        if !href.contains("view-message.jsp") {
            return None;
        }
        query_param(href, "cid")?.parse().ok()
    });
    Ok(CommentPost {
        id,
        subject,
        sign: parse_sign(msg)?,
        reply_to,
        body: render_element(body_el),
    })
}

fn parse_sign(msg: ElementRef) -> Result<Sign, RemoteError> {
    let sel = selectors();
    let sign_el = msg
        .select(&sel.sign)
        .next()
        .ok_or(RemoteError::Layout("message without signature"))?;
    let whois = sign_el
        .select(&sel.whois)
        .next()
        .ok_or(RemoteError::Layout("signature without author"))?;
    let nick = collapsed_text(whois);
    if nick.is_empty() {
        return Err(RemoteError::Layout("signature with empty author"));
    }
    // the Forum strikes banned users through
    let banned = std::iter::successors(whois.parent(), |n| n.parent()).any(|n| {
        ElementRef::wrap(n).is_some_and(|e| e.value().name() == "s")
    });
    let stars = sign_el
        .select(&sel.stars)
        .next()
        .map(collapsed_text)
        .unwrap_or_default();
    let (_, date) = split_sign_date(&collapsed_text(sign_el));
    let date = date.and_then(|d| parse_forum_date(&d));
    Ok(Sign {
        nick,
        banned,
        stars,
        date,
    })
}

/// Split `name (dd.mm.yyyy HH:MM:SS)` into its halves.
fn split_sign_date(text: &str) -> (Option<String>, Option<String>) {
    static DATE_RE: OnceLock<Regex> = OnceLock::new();
    let re = DATE_RE.get_or_init(|| {
        Regex::new(r"\((\d{2}\.\d{2}\.\d{4} \d{2}:\d{2}:\d{2})\)").expect("static regex")
    });
    match re.captures(text) {
        Some(caps) => {
            let date = caps.get(1).map(|m| m.as_str().to_string());
            let name = text[..caps.get(0).map_or(0, |m| m.start())].trim();
            (
                if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                date,
            )
        }
        None => {
            let name = text.trim();
            (
                if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                None,
            )
        }
    }
}

/// `dd.mm.yyyy HH:MM:SS` as displayed by the Forum, taken as UTC.
pub fn parse_forum_date(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%d.%m.%Y %H:%M:%S").ok()
}

/// Approximate age out of a lastmod interval string: relative Russian
/// phrases or an absolute date. Unparseable strings yield `None` and never
/// terminate a walk.
pub fn parse_age(s: &str, now: DateTime<Utc>) -> Option<Duration> {
    static UNIT_RE: OnceLock<Regex> = OnceLock::new();
    let re = UNIT_RE.get_or_init(|| {
        Regex::new(r"(?x)
            (\d+)\s*
            (мин | час | д(?:ень|ня|ней) | недел | месяц | год | лет)
        ")
        .expect("static regex")
    });
    let s = s.trim();
    if s.contains("секунд") || s.contains("только что") {
        return Some(Duration::zero());
    }
    if s.starts_with("сегодня") {
        return Some(Duration::zero());
    }
    if s.starts_with("вчера") {
        return Some(Duration::days(1));
    }
    if let Some(caps) = re.captures(s) {
        let n: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();
        let dur = if unit.starts_with("мин") {
            Duration::minutes(n)
        } else if unit.starts_with("час") {
            Duration::hours(n)
        } else if unit.starts_with('д') {
            Duration::days(n)
        } else if unit.starts_with("недел") {
            Duration::weeks(n)
        } else if unit.starts_with("месяц") {
            Duration::days(30 * n)
        } else {
            Duration::days(365 * n)
        };
        return Some(dur);
    }
    // absolute dd.mm.yyyy or dd.mm.yy
    for fmt in ["%d.%m.%Y", "%d.%m.%y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(now.naive_utc() - midnight);
        }
    }
    None
}
