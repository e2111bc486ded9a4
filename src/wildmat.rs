//! Group patterns: comma-separated glob items with optional `!` negation.
//!
//! The same grammar serves `LIST ACTIVE`/`LIST NEWSGROUPS`/`NEWNEWS` and the
//! lorpull command line. Evaluation is short-circuit in item order: the first
//! item whose glob matches decides, positive items select and `!` items
//! reject. A group with no matching item does not match.

use std::fmt;

/// Match a single glob against a group name. `*` matches any run of
/// characters, `?` exactly one.
#[must_use]
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'?') => !t.is_empty() && inner(&p[1..], &t[1..]),
            Some(b'*') => {
                if inner(&p[1..], t) {
                    return true;
                }
                (0..t.len()).any(|i| inner(&p[1..], &t[i + 1..]))
            }
            Some(&c) => !t.is_empty() && t[0] == c && inner(&p[1..], &t[1..]),
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadPattern;

impl fmt::Display for BadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid pattern")
    }
}

impl std::error::Error for BadPattern {}

#[derive(Debug, Clone)]
struct Item {
    negated: bool,
    glob: String,
}

/// A parsed pattern list.
#[derive(Debug, Clone)]
pub struct Pattern {
    items: Vec<Item>,
}

impl Pattern {
    pub fn parse(spec: &str) -> Result<Self, BadPattern> {
        if spec.is_empty() {
            return Err(BadPattern);
        }
        let mut items = Vec::new();
        for raw in spec.split(',') {
            let (negated, glob) = match raw.strip_prefix('!') {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            if glob.is_empty()
                || glob
                    .chars()
                    .any(|c| c.is_whitespace() || matches!(c, '!' | '[' | ']' | '\\'))
            {
                return Err(BadPattern);
            }
            items.push(Item {
                negated,
                glob: glob.to_string(),
            });
        }
        Ok(Self { items })
    }

    /// First item whose glob matches decides the polarity.
    #[must_use]
    pub fn matches(&self, group: &str) -> bool {
        for item in &self.items {
            if glob_match(&item.glob, group) {
                return !item.negated;
            }
        }
        false
    }
}
