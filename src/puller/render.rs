//! Forum HTML bodies rendered to plain UTF-8 text.
//!
//! The rules are the ones newsreaders expect from a gateway:
//!
//! - hard wrap at 72 columns, measured without the leading quote/list
//!   prefixes;
//! - nested unordered lists alternate `*` and `-` bullets by depth;
//! - blockquotes prefix lines with one `>` per depth;
//! - `<pre>` blocks pass through verbatim between blank lines;
//! - an anchor whose text is the href (or a visible truncation of it)
//!   collapses to the bare URL, anything else becomes `text (url)`;
//! - a trailing `>>> label (url)` line is stripped off and reported
//!   separately so the puller can promote it into a header.

use scraper::{ElementRef, Html};

pub const WRAP_COLUMNS: usize = 72;

/// The Forum's label on poll links; promoted to `X-Vote-URL`.
pub const VOTE_LABEL: &str = "Голосовать";

/// A stripped trailing `>>> label (url)` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedLink {
    pub label: String,
    pub url: String,
}

/// A rendered message body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub link: Option<PromotedLink>,
}

/// Render the contents of a message-text element.
#[must_use]
pub fn render_element(root: ElementRef) -> Rendered {
    let mut r = Renderer::default();
    r.walk_children(root);
    r.flush();
    r.finish()
}

/// Render a standalone HTML fragment (tests and the parser seam use this).
#[must_use]
pub fn render_fragment(html: &str) -> Rendered {
    let doc = Html::parse_fragment(html);
    render_element(doc.root_element())
}

#[derive(Default)]
struct Renderer {
    lines: Vec<String>,
    /// Logical lines of the paragraph being collected; `<br>` starts a new
    /// one.
    para: Vec<String>,
    quote: usize,
    list: usize,
    /// Set inside `<li>` until its first flushed line has taken the bullet.
    bullet: bool,
}

impl Renderer {
    fn walk_children(&mut self, el: ElementRef) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                self.push_inline(text);
            } else if let Some(child_el) = ElementRef::wrap(child) {
                self.walk_element(child_el);
            }
        }
    }

    fn walk_element(&mut self, el: ElementRef) {
        match el.value().name() {
            "p" | "div" => {
                self.flush();
                self.walk_children(el);
                self.flush();
            }
            "br" => self.para.push(String::new()),
            "blockquote" => {
                self.flush();
                self.quote += 1;
                self.walk_children(el);
                self.flush();
                self.quote -= 1;
            }
            "ul" | "ol" => {
                self.flush();
                self.list += 1;
                self.walk_children(el);
                self.flush();
                self.list -= 1;
            }
            "li" => {
                self.flush();
                self.bullet = true;
                self.walk_children(el);
                self.flush();
                self.bullet = false;
            }
            "pre" => {
                self.flush();
                self.verbatim(&el.text().collect::<String>());
            }
            "a" => {
                let rendered = render_anchor(el);
                self.push_inline(&rendered);
            }
            "img" => {}
            _ => self.walk_children(el),
        }
    }

    fn push_inline(&mut self, text: &str) {
        if self.para.is_empty() {
            self.para.push(String::new());
        }
        let Some(last) = self.para.last_mut() else {
            return;
        };
        for piece in text.split_whitespace() {
            if !last.is_empty() && !last.ends_with(' ') {
                last.push(' ');
            }
            last.push_str(piece);
        }
        // keep a separator for the next inline run when the source text
        // ended in whitespace
        if text.ends_with(char::is_whitespace) && !last.is_empty() && !last.ends_with(' ') {
            last.push(' ');
        }
    }

    /// Continuation prefix at the current nesting.
    fn prefix(&self) -> String {
        let mut p = String::new();
        if self.quote > 0 {
            p.push_str(&">".repeat(self.quote));
            p.push(' ');
        }
        p.push_str(&"  ".repeat(self.list));
        p
    }

    /// First-line prefix: same as [`prefix`](Self::prefix) but with the
    /// bullet in place of the innermost indent.
    fn first_prefix(&self) -> String {
        if !self.bullet || self.list == 0 {
            return self.prefix();
        }
        let mut p = String::new();
        if self.quote > 0 {
            p.push_str(&">".repeat(self.quote));
            p.push(' ');
        }
        p.push_str(&"  ".repeat(self.list - 1));
        p.push(if self.list % 2 == 1 { '*' } else { '-' });
        p.push(' ');
        p
    }

    fn flush(&mut self) {
        let logical: Vec<String> = std::mem::take(&mut self.para)
            .into_iter()
            .map(|l| l.trim_end().to_string())
            .collect();
        if logical.iter().all(String::is_empty) {
            return;
        }
        self.separate();
        let mut first = true;
        for line in logical {
            for wrapped in wrap(&line, WRAP_COLUMNS) {
                let prefix = if first {
                    self.first_prefix()
                } else {
                    self.prefix()
                };
                self.lines.push(format!("{prefix}{wrapped}"));
                first = false;
            }
        }
        self.bullet = false;
    }

    /// Blank line between blocks, except between list items.
    fn separate(&mut self) {
        if !self.lines.is_empty() && self.list == 0 {
            self.lines.push(String::new());
        }
    }

    fn verbatim(&mut self, text: &str) {
        let prefix = self.prefix();
        if !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        for line in text.lines() {
            self.lines.push(format!("{prefix}{}", line.trim_end()));
        }
    }

    fn finish(mut self) -> Rendered {
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        let link = self.take_trailing_link();
        while self.lines.last().is_some_and(String::is_empty) {
            self.lines.pop();
        }
        let mut text = self.lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        Rendered { text, link }
    }

    fn take_trailing_link(&mut self) -> Option<PromotedLink> {
        let last = self.lines.last()?;
        let rest = last.strip_prefix(">>> ")?;
        let (label, url) = rest.rsplit_once(" (")?;
        let url = url.strip_suffix(')')?;
        if label.is_empty() || url.is_empty() || url.contains(' ') {
            return None;
        }
        let link = PromotedLink {
            label: label.to_string(),
            url: url.to_string(),
        };
        self.lines.pop();
        Some(link)
    }
}

/// Collapse an anchor per the gateway rules.
fn render_anchor(el: ElementRef) -> String {
    let text = el
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let Some(href) = el.value().attr("href") else {
        return text;
    };
    if text == href || is_truncation(&text, href) {
        return href.to_string();
    }
    if text.is_empty() {
        return href.to_string();
    }
    format!("{text} ({href})")
}

/// True when the anchor text is the href shortened for display.
fn is_truncation(text: &str, href: &str) -> bool {
    for ellipsis in ["...", "…"] {
        if let Some(stem) = text.strip_suffix(ellipsis) {
            if !stem.is_empty() && href.starts_with(stem) {
                return true;
            }
        }
    }
    false
}

/// Greedy word wrap; a single over-long word stays on its own line.
fn wrap(line: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut current_width = 0;
    for word in line.split_whitespace() {
        let wlen = word.chars().count();
        if current_width > 0 && current_width + 1 + wlen > width {
            out.push(std::mem::take(&mut current));
            current_width = 0;
        }
        if current_width > 0 {
            current.push(' ');
            current_width += 1;
        }
        current.push_str(word);
        current_width += wlen;
    }
    if !current.is_empty() {
        out.push(current);
    }
    if out.is_empty() {
        out.push(String::new());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraphs_and_wrap() {
        let long = "word ".repeat(30);
        let r = render_fragment(&format!("<p>{long}</p><p>short</p>"));
        let lines: Vec<&str> = r.text.lines().collect();
        assert!(lines[0].chars().count() <= 72);
        assert!(lines.iter().filter(|l| l.is_empty()).count() >= 1);
        assert_eq!(*lines.last().unwrap(), "short");
    }

    #[test]
    fn blockquote_depth() {
        let r = render_fragment(
            "<blockquote><blockquote><p>deep</p></blockquote><p>outer</p></blockquote>",
        );
        let lines: Vec<&str> = r.text.lines().collect();
        assert_eq!(lines[0], ">> deep");
        assert_eq!(*lines.last().unwrap(), "> outer");
    }

    #[test]
    fn quoted_wrap_excludes_prefix() {
        let long = "слово ".repeat(20);
        let r = render_fragment(&format!("<blockquote><p>{long}</p></blockquote>"));
        for line in r.text.lines().filter(|l| !l.is_empty()) {
            assert!(line.starts_with("> "));
            let content = line.trim_start_matches("> ");
            assert!(content.chars().count() <= 72);
        }
    }

    #[test]
    fn nested_lists_alternate_bullets() {
        let r = render_fragment(
            "<ul><li>one</li><li>two<ul><li>deep</li></ul></li></ul>",
        );
        let lines: Vec<&str> = r.text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines[0], "* one");
        assert_eq!(lines[1], "* two");
        assert_eq!(lines[2], "  - deep");
    }

    #[test]
    fn pre_is_verbatim() {
        let r = render_fragment("<p>intro</p><pre>if (x)  {\n    y();\n}</pre><p>after</p>");
        let text = r.text;
        assert!(text.contains("\n\nif (x)  {\n    y();\n}\n\nafter"), "{text}");
    }

    #[test]
    fn anchor_same_as_href_collapses() {
        let r = render_fragment(r#"<p><a href="http://example.com/x">http://example.com/x</a></p>"#);
        assert_eq!(r.text, "http://example.com/x\n");
    }

    #[test]
    fn anchor_truncation_collapses() {
        let r = render_fragment(
            r#"<p><a href="http://example.com/long/path">http://example.com/lo...</a></p>"#,
        );
        assert_eq!(r.text, "http://example.com/long/path\n");
    }

    #[test]
    fn anchor_with_label_keeps_both() {
        let r = render_fragment(r#"<p>see <a href="http://example.com/">here</a></p>"#);
        assert_eq!(r.text, "see here (http://example.com/)\n");
    }

    #[test]
    fn br_breaks_lines() {
        let r = render_fragment("<p>one<br>two</p>");
        assert_eq!(r.text, "one\ntwo\n");
    }

    #[test]
    fn trailing_link_is_promoted() {
        let r = render_fragment(
            r#"<p>body text</p><p>&gt;&gt;&gt; <a href="http://example.com/page">Подробности</a></p>"#,
        );
        assert_eq!(r.text, "body text\n");
        let link = r.link.unwrap();
        assert_eq!(link.label, "Подробности");
        assert_eq!(link.url, "http://example.com/page");
    }

    #[test]
    fn vote_label_constant_matches() {
        let r = render_fragment(
            r#"<p>poll</p><p>&gt;&gt;&gt; <a href="http://example.com/vote.jsp?msgid=1">Голосовать</a></p>"#,
        );
        assert_eq!(r.link.unwrap().label, VOTE_LABEL);
    }
}
