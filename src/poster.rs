//! The poster: one complete message in on stdin, one HTTP form out.
//!
//! The message is validated, the posting user's session is reused from the
//! persistent cookie jar (refreshing it when the token would expire before
//! the submission could plausibly complete), and the article becomes a
//! `add.jsp` or `add_comment.jsp` form submission. Success is silent; any
//! failure is one diagnostic line and a non-zero exit, which the NNTP
//! server forwards as `441`.

use crate::article::{Article, LorId};
use crate::client::Forum;
use crate::config::Config;
use crate::cookies::CookieJar;
use crate::error::RemoteError;
use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use smallvec::SmallVec;
use std::path::PathBuf;
use tracing::debug;

/// The Forum's `<title>` prefix on error pages.
const ERROR_TITLE_MARKER: &str = "Ошибка";

const SESSION_COOKIE: &str = "JSESSIONID";

/// Markup mode sent with a new topic.
const TOPIC_MODE: &str = "tex";
/// Markup mode sent with a comment.
const COMMENT_MODE: &str = "ntobrq";

/// Where a submission goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Topic,
    Comment { topic: u64, reply_to: Option<u64> },
}

/// A validated submission, ready to be turned into form fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub nick: String,
    pub group: String,
    pub target: Target,
    pub title: String,
    pub body: String,
    pub linktext: String,
    pub url: String,
    pub tags: String,
    pub image: Option<PathBuf>,
}

/// Validate the input message and extract everything the forms need.
pub fn prepare(article: &Article) -> anyhow::Result<Submission> {
    let froms: SmallVec<[&str; 2]> = article.header_values("From").collect();
    if froms.len() != 1 {
        bail!("exactly one From header required");
    }
    let nick = from_nick(froms[0]).context("From must contain exactly one address")?;
    if nick.eq_ignore_ascii_case("anonymous") {
        bail!("anonymous posting is not supported");
    }

    let groups: SmallVec<[&str; 2]> = article.header_values("Newsgroups").collect();
    if groups.len() != 1 || groups[0].contains(',') || groups[0].trim().is_empty() {
        bail!("exactly one Newsgroups required");
    }
    let group = groups[0].trim().to_string();

    let title = article
        .header("Subject")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .context("Subject required")?
        .to_string();

    let target = match article.header("References") {
        None => Target::Topic,
        Some(refs) => {
            let last = refs
                .split_whitespace()
                .last()
                .context("empty References")?;
            let id = LorId::parse(last).context("References does not name a forum article")?;
            Target::Comment {
                topic: id.topic,
                reply_to: id.comment,
            }
        }
    };

    Ok(Submission {
        nick,
        group,
        target,
        title,
        body: article.body.clone(),
        linktext: article.header("X-Link-Text").unwrap_or("").to_string(),
        url: article.header("X-Link-URL").unwrap_or("").to_string(),
        tags: article.header("Keywords").unwrap_or("").to_string(),
        image: article.header("X-Image-Path").map(PathBuf::from),
    })
}

/// Single-address From parsing: `nick <nick@host>` or a bare address; the
/// local part is the Forum nick.
fn from_nick(value: &str) -> Option<String> {
    if value.contains(',') {
        return None;
    }
    let addr = match (value.find('<'), value.rfind('>')) {
        (Some(i), Some(j)) if j > i => &value[i + 1..j],
        _ => value.trim(),
    };
    let (local, domain) = addr.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(local.to_string())
}

/// Refresh when the session token would expire before the submission could
/// plausibly complete (within `timeout` seconds), or when there is no
/// session at all.
pub fn needs_login(jar: &CookieJar, timeout_secs: u64, now: DateTime<Utc>) -> bool {
    jar.get(SESSION_COOKIE).is_none() || jar.expires_within(timeout_secs, now)
}

/// Scan a response page: an error `<title>` is a login failure, an error
/// block is a submission failure. Anything else is success.
pub fn check_response(body: &str) -> Result<(), RemoteError> {
    let doc = Html::parse_document(body);
    let title_sel = Selector::parse("title").expect("static selector");
    let error_sel = Selector::parse("div.error").expect("static selector");
    if let Some(title) = doc.select(&title_sel).next() {
        let text = collapse(&title.text().collect::<String>());
        if text.starts_with(ERROR_TITLE_MARKER) {
            return Err(RemoteError::Login(text));
        }
    }
    if let Some(error) = doc.select(&error_sel).next() {
        return Err(RemoteError::Form(collapse(&error.text().collect::<String>())));
    }
    Ok(())
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The whole pipeline: parse, validate, refresh the session, submit.
pub async fn run(
    config: &Config,
    input: &str,
    timeout: std::time::Duration,
) -> anyhow::Result<()> {
    run_with_base(config, input, timeout, None).await
}

/// [`run`] against an explicit base URL instead of the Forum.
pub async fn run_with_base(
    config: &Config,
    input: &str,
    timeout: std::time::Duration,
    base: Option<String>,
) -> anyhow::Result<()> {
    let article = Article::parse(input).context("cannot parse article")?;
    let submission = prepare(&article)?;

    let catalog = config.load_catalog()?;
    let entry = catalog
        .get(&submission.group)
        .ok_or_else(|| crate::error::ConfigError::UnknownGroup(submission.group.clone()))?;
    let forum_id = entry.forum_id;
    let passwd = config.load_password(&submission.nick)?;

    // concurrent postings for one user serialize here; the jar is read,
    // refreshed and re-saved under this lock
    let _user_lock = lock_user(config, &submission.nick).await?;

    let mut forum = Forum::for_user(config.cookies_path(&submission.nick), timeout)?;
    if let Some(base) = base {
        forum = forum.with_base(base);
    }

    if needs_login(forum.jar(), timeout.as_secs(), Utc::now()) {
        debug!(nick = %submission.nick, "logging in");
        let page = forum
            .post_form(
                "/login.jsp",
                &[
                    ("nick", submission.nick.clone()),
                    ("passwd", passwd),
                ],
            )
            .await?;
        check_response(&page)?;
    } else {
        debug!("touching session");
        forum.get("/").await?;
    }
    forum.persist_jar();

    let session = forum
        .jar()
        .get(SESSION_COOKIE)
        .map(|c| c.value.clone())
        .ok_or_else(|| RemoteError::Login("no session cookie after login".to_string()))?;

    let (path, fields) = submission_form(&submission, forum_id, &session);
    let page = match &submission.image {
        None => forum.post_form(path, &fields).await?,
        Some(image_path) => {
            let data = tokio::fs::read(image_path)
                .await
                .with_context(|| format!("cannot read {}", image_path.display()))?;
            let file_name = image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let mut form = reqwest::multipart::Form::new();
            for (k, v) in &fields {
                form = form.text((*k).to_string(), v.clone());
            }
            form = form.part(
                "image",
                reqwest::multipart::Part::bytes(data).file_name(file_name),
            );
            forum.post_multipart(path, form).await?
        }
    };
    check_response(&page)?;
    Ok(())
}

/// Exclusive advisory lock on the user's directory, held for the whole
/// submission.
async fn lock_user(
    config: &Config,
    nick: &str,
) -> anyhow::Result<nix::fcntl::Flock<std::fs::File>> {
    use nix::fcntl::{Flock, FlockArg};

    let dir = config.user_dir(nick);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("cannot create {}", dir.display()))?;
    let path = dir.join("cookies.lock");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let lock = tokio::task::spawn_blocking(move || Flock::lock(file, FlockArg::LockExclusive))
        .await
        .map_err(std::io::Error::other)?
        .map_err(|(_, errno)| anyhow::anyhow!("cannot lock {}: {errno}", path.display()))?;
    Ok(lock)
}

/// Endpoint and fields for a submission.
fn submission_form(
    submission: &Submission,
    forum_id: u64,
    session: &str,
) -> (&'static str, Vec<(&'static str, String)>) {
    let mut fields: Vec<(&'static str, String)> = vec![("session", session.to_string())];
    let path = match submission.target {
        Target::Topic => {
            fields.push(("group", forum_id.to_string()));
            fields.push(("topic", String::new()));
            fields.push(("replyto", String::new()));
            "/add.jsp"
        }
        Target::Comment { topic, reply_to } => {
            fields.push(("topic", topic.to_string()));
            fields.push((
                "replyto",
                reply_to.map(|c| c.to_string()).unwrap_or_default(),
            ));
            "/add_comment.jsp"
        }
    };
    fields.push(("title", submission.title.clone()));
    fields.push(("msg", submission.body.clone()));
    fields.push(("linktext", submission.linktext.clone()));
    fields.push(("url", submission.url.clone()));
    fields.push(("tags", submission.tags.clone()));
    let mode = match submission.target {
        Target::Topic => TOPIC_MODE,
        Target::Comment { .. } => COMMENT_MODE,
    };
    fields.push(("mode", mode.to_string()));
    fields.push(("autourl", "1".to_string()));
    (path, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(text: &str) -> Article {
        Article::parse(text).unwrap()
    }

    #[test]
    fn prepare_topic() {
        let a = article(
            "From: nick <nick@linux.org.ru>\nNewsgroups: lor.forum.talks\n\
             Subject: Hello\nKeywords: linux\nX-Link-URL: http://x/\nX-Link-Text: see\n\nbody\n",
        );
        let s = prepare(&a).unwrap();
        assert_eq!(s.nick, "nick");
        assert_eq!(s.target, Target::Topic);
        assert_eq!(s.tags, "linux");
        assert_eq!(s.url, "http://x/");
        assert_eq!(s.linktext, "see");
    }

    #[test]
    fn prepare_comment_targets_last_reference() {
        let a = article(
            "From: nick <nick@linux.org.ru>\nNewsgroups: lor.forum.talks\nSubject: Re: H\n\
             References: <lor12345@linux.org.ru> <lor12345.678@linux.org.ru>\n\nbody\n",
        );
        let s = prepare(&a).unwrap();
        assert_eq!(
            s.target,
            Target::Comment {
                topic: 12345,
                reply_to: Some(678)
            }
        );
    }

    #[test]
    fn prepare_first_level_comment_has_empty_replyto() {
        let a = article(
            "From: nick <nick@linux.org.ru>\nNewsgroups: g\nSubject: Re: H\n\
             References: <lor12345@linux.org.ru>\n\nbody\n",
        );
        let s = prepare(&a).unwrap();
        assert_eq!(
            s.target,
            Target::Comment {
                topic: 12345,
                reply_to: None
            }
        );
    }

    #[test]
    fn prepare_rejects_anonymous_and_multi() {
        let anon = article("From: anonymous <anonymous@x>\nNewsgroups: g\nSubject: s\n\nb\n");
        assert!(prepare(&anon).is_err());
        let multi = article("From: a <a@x>, b <b@x>\nNewsgroups: g\nSubject: s\n\nb\n");
        assert!(prepare(&multi).is_err());
        let groups = article("From: a <a@x>\nNewsgroups: g1,g2\nSubject: s\n\nb\n");
        assert!(prepare(&groups).is_err());
        let nosubj = article("From: a <a@x>\nNewsgroups: g\n\nb\n");
        assert!(prepare(&nosubj).is_err());
        let badref = article(
            "From: a <a@x>\nNewsgroups: g\nSubject: s\nReferences: <zzz@elsewhere>\n\nb\n",
        );
        assert!(prepare(&badref).is_err());
    }

    #[test]
    fn comment_form_fields() {
        let s = Submission {
            nick: "nick".into(),
            group: "lor.forum.talks".into(),
            target: Target::Comment {
                topic: 12345,
                reply_to: None,
            },
            title: "Re: H".into(),
            body: ".Hello\n".into(),
            linktext: String::new(),
            url: String::new(),
            tags: String::new(),
            image: None,
        };
        let (path, fields) = submission_form(&s, 42, "SESS");
        assert_eq!(path, "/add_comment.jsp");
        let get = |k: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == k)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("session"), "SESS");
        assert_eq!(get("topic"), "12345");
        assert_eq!(get("replyto"), "");
        assert_eq!(get("mode"), "ntobrq");
        assert_eq!(get("autourl"), "1");
        assert_eq!(get("msg"), ".Hello\n");
        assert!(!fields.iter().any(|(n, _)| *n == "group"));
    }

    #[test]
    fn topic_form_fields() {
        let s = Submission {
            nick: "nick".into(),
            group: "lor.forum.talks".into(),
            target: Target::Topic,
            title: "H".into(),
            body: "b".into(),
            linktext: "see".into(),
            url: "http://x/".into(),
            tags: "linux".into(),
            image: None,
        };
        let (path, fields) = submission_form(&s, 42, "SESS");
        assert_eq!(path, "/add.jsp");
        let get = |k: &str| {
            fields
                .iter()
                .find(|(n, _)| *n == k)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("group"), "42");
        assert_eq!(get("mode"), "tex");
        assert_eq!(get("url"), "http://x/");
    }

    #[test]
    fn login_needed_without_session_or_near_expiry() {
        let now = Utc::now();
        let empty = CookieJar::default();
        assert!(needs_login(&empty, 20, now));

        let mut near = CookieJar::default();
        near.store("JSESSIONID=abc; Max-Age=5");
        assert!(needs_login(&near, 20, now));

        let mut fresh = CookieJar::default();
        fresh.store("JSESSIONID=abc; Max-Age=86400");
        assert!(!needs_login(&fresh, 20, now));
    }

    #[test]
    fn response_title_error_is_login_failure() {
        let err = check_response(
            "<html><head><title>Ошибка: неверный пароль</title></head><body></body></html>",
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::Login(msg) if msg.contains("пароль")));
    }

    #[test]
    fn response_error_div_is_form_failure() {
        let err = check_response(
            "<html><head><title>linux.org.ru</title></head>\
             <body><div class=\"error\">Слишком часто</div></body></html>",
        )
        .unwrap_err();
        assert!(matches!(err, RemoteError::Form(msg) if msg == "Слишком часто"));
    }

    #[test]
    fn clean_response_is_success() {
        assert!(
            check_response("<html><head><title>linux.org.ru</title></head><body>ok</body></html>")
                .is_ok()
        );
    }
}
