//! The article model shared by all three programs.
//!
//! An article is an RFC-5322-style message kept as one UTF-8 file, LF line
//! endings on disk. Message-IDs encode the Forum coordinates of the message:
//! `<lor{TOPIC}@linux.org.ru>` for a thread start and
//! `<lor{TOPIC}.{COMMENT}@linux.org.ru>` for a comment. Comment number 0
//! within a thread directory is reserved for the topic body.

use std::fmt;

pub const MSGID_DOMAIN: &str = "linux.org.ru";

/// Forum coordinates of an article, as carried by its Message-ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LorId {
    pub topic: u64,
    pub comment: Option<u64>,
}

impl LorId {
    #[must_use]
    pub fn topic(topic: u64) -> Self {
        Self {
            topic,
            comment: None,
        }
    }

    #[must_use]
    pub fn comment(topic: u64, comment: u64) -> Self {
        Self {
            topic,
            comment: Some(comment),
        }
    }

    /// Parse `<lor123@linux.org.ru>` / `<lor123.456@linux.org.ru>`.
    /// Anything else, including IDs from other installations, is rejected.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let inner = s.strip_prefix("<lor")?.strip_suffix(">")?;
        let (nums, domain) = inner.split_once('@')?;
        if domain != MSGID_DOMAIN {
            return None;
        }
        let (topic, comment) = match nums.split_once('.') {
            Some((t, c)) => (t, Some(c)),
            None => (nums, None),
        };
        if topic.is_empty() || !topic.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let comment = match comment {
            Some(c) => {
                if c.is_empty() || !c.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                Some(c.parse().ok()?)
            }
            None => None,
        };
        Some(Self {
            topic: topic.parse().ok()?,
            comment,
        })
    }

    /// The store path relative to the group directory, `{TOPIC}/{COMMENT}`.
    /// This is also the value kept under the article's number key.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}/{}", self.topic, self.comment.unwrap_or(0))
    }

    /// Inverse of [`location`](Self::location): comment 0 is the topic
    /// body.
    #[must_use]
    pub fn from_location(loc: &str) -> Option<Self> {
        let (topic, comment) = loc.split_once('/')?;
        let topic = topic.parse().ok()?;
        let comment: u64 = comment.parse().ok()?;
        Some(if comment == 0 {
            Self::topic(topic)
        } else {
            Self::comment(topic, comment)
        })
    }
}

impl fmt::Display for LorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comment {
            Some(c) => write!(f, "<lor{}.{}@{}>", self.topic, c, MSGID_DOMAIN),
            None => write!(f, "<lor{}@{}>", self.topic, MSGID_DOMAIN),
        }
    }
}

/// A parsed article: ordered headers and a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Article {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Article {
    /// Parse headers and body. Accepts LF or CRLF line endings and folded
    /// continuation lines; returns `None` when the header block is
    /// malformed.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let mut headers: Vec<(String, String)> = Vec::new();
        let mut rest = text;
        loop {
            let (line, after) = match rest.split_once('\n') {
                Some((l, a)) => (l.trim_end_matches('\r'), a),
                None => (rest.trim_end_matches('\r'), ""),
            };
            if line.is_empty() {
                rest = after;
                break;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                // folded continuation of the previous header
                let (_, value) = headers.last_mut()?;
                value.push(' ');
                value.push_str(line.trim_start());
            } else {
                let (name, value) = line.split_once(':')?;
                if name.is_empty() {
                    return None;
                }
                headers.push((name.to_string(), value.trim_start().to_string()));
            }
            if after.is_empty() {
                rest = "";
                break;
            }
            rest = after;
        }
        Some(Self {
            headers,
            body: rest.to_string(),
        })
    }

    /// First header with the given name, case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values of a header, case-insensitive.
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header("Message-ID")
    }

    #[must_use]
    pub fn lor_id(&self) -> Option<LorId> {
        LorId::parse(self.message_id()?.trim())
    }

    /// Encode for disk: headers, blank line, body, LF endings.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        if !self.body.is_empty() && !self.body.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Byte length of the encoded article, as reported in overview records.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.encode().len()
    }

    #[must_use]
    pub fn body_lines(&self) -> usize {
        self.body.lines().count()
    }
}
