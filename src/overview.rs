//! Overview records: the `:N` index values answering OVER without opening
//! the article file.
//!
//! A record is tab-separated in the order [`OVERVIEW_FORMAT`] advertises:
//! Subject, From, Date, Message-ID, References (empty if absent), the byte
//! length of the encoded article, the body line count, and the full
//! `X-Stars:` header (value may be empty). Subject and From are stored
//! MIME-header-encoded; [`decode_record`] undoes that for the wire.

use crate::article::Article;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Field list reported by LIST OVERVIEW.FMT.
pub const OVERVIEW_FORMAT: &[&str] = &[
    "Subject:",
    "From:",
    "Date:",
    "Message-ID:",
    "References:",
    "Bytes:",
    "Lines:",
    "X-Stars:full",
];

/// Encode a header value as an RFC 2047 encoded word when it is not plain
/// printable ASCII.
#[must_use]
pub fn encode_header(value: &str) -> String {
    if value.bytes().all(|b| (0x20..0x7f).contains(&b)) {
        return value.to_string();
    }
    format!("=?utf-8?b?{}?=", BASE64.encode(value.as_bytes()))
}

/// Decode every `=?utf-8?b?…?=` encoded word in a header value. Tokens that
/// fail to decode are passed through untouched.
#[must_use]
pub fn decode_header(value: &str) -> String {
    let mut out = String::new();
    let mut rest = value;
    while let Some(start) = rest.find("=?") {
        out.push_str(&rest[..start]);
        let token = &rest[start..];
        match decode_word(token) {
            Some((decoded, used)) => {
                out.push_str(&decoded);
                rest = &token[used..];
            }
            None => {
                out.push_str("=?");
                rest = &token[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode one encoded word at the start of `s`; returns the text and the
/// number of input bytes consumed.
fn decode_word(s: &str) -> Option<(String, usize)> {
    let body = s.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    let (enc, body) = body.split_once('?')?;
    if !enc.eq_ignore_ascii_case("b") {
        return None;
    }
    let end = body.find("?=")?;
    let bytes = BASE64.decode(&body[..end]).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    let used = s.len() - body.len() + end + 2;
    Some((text, used))
}

/// Build the stored record for an article, fields in the
/// [`OVERVIEW_FORMAT`] order so clients can parse OVER positionally.
#[must_use]
pub fn overview_record(article: &Article) -> String {
    let field = |name: &str| article.header(name).unwrap_or("").to_string();
    let stars = field("X-Stars");
    [
        encode_header(&field("Subject")),
        encode_header(&field("From")),
        field("Date"),
        field("Message-ID"),
        field("References"),
        article.encoded_len().to_string(),
        article.body_lines().to_string(),
        format!("X-Stars: {stars}"),
    ]
    .join("\t")
}

/// Decode a stored record for transmission.
#[must_use]
pub fn decode_record(record: &str) -> String {
    record
        .split('\t')
        .map(decode_header)
        .collect::<Vec<_>>()
        .join("\t")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_headers_stay_plain() {
        assert_eq!(encode_header("Re: plain subject"), "Re: plain subject");
    }

    #[test]
    fn non_ascii_roundtrips() {
        let subj = "Проблема с ядром";
        let encoded = encode_header(subj);
        assert!(encoded.starts_with("=?utf-8?b?"));
        assert_eq!(decode_header(&encoded), subj);
    }

    #[test]
    fn decode_leaves_broken_tokens() {
        assert_eq!(decode_header("=?koi8-r?b?abc?="), "=?koi8-r?b?abc?=");
        assert_eq!(decode_header("x =? y"), "x =? y");
    }

    #[test]
    fn record_fields_follow_advertised_order() {
        let art = Article::parse(
            "Subject: S\nFrom: nick <nick@linux.org.ru>\nDate: D\n\
             Message-ID: <lor1@linux.org.ru>\nX-Stars: **\n\nbody\nlines\n",
        )
        .unwrap();
        let rec = overview_record(&art);
        let fields: Vec<&str> = rec.split('\t').collect();
        assert_eq!(fields.len(), OVERVIEW_FORMAT.len());
        assert_eq!(fields[0], "S");
        assert_eq!(fields[3], "<lor1@linux.org.ru>");
        assert_eq!(fields[4], "");
        assert_eq!(fields[5], art.encoded_len().to_string());
        assert_eq!(fields[6], "2");
        assert_eq!(fields[7], "X-Stars: **");
    }

    #[test]
    fn decode_record_decodes_each_field() {
        let art = Article::parse("Subject: Тема\nFrom: a@b\n\nb\n").unwrap();
        let rec = overview_record(&art);
        let decoded = decode_record(&rec);
        assert!(decoded.starts_with("Тема\t"));
    }
}
