//! Wire-level parsers for the NNTP side of the gateway.

use chrono::TimeZone;
use nom::IResult;
use nom::{
    bytes::complete::{is_not, take_while1},
    character::complete::{crlf, space1},
    combinator::opt,
    multi::separated_list1,
    sequence::preceded,
};

#[derive(Debug, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a single NNTP command line as described in RFC 3977
/// Section 3.1 "Commands and Responses". The name is uppercased here so
/// dispatch can match on it directly.
pub fn parse_command(input: &str) -> IResult<&str, Command> {
    let (input, name) = take_while1(|c: char| c.is_ascii_alphabetic())(input)?;
    let (input, args) = opt(preceded(space1, separated_list1(space1, is_not(" \r\n"))))(input)?;
    let (input, _) = opt(crlf)(input)?;
    let args_vec = args
        .unwrap_or_default()
        .into_iter()
        .map(|s: &str| s.to_string())
        .collect();
    Ok((
        input,
        Command {
            name: name.to_ascii_uppercase(),
            args: args_vec,
        },
    ))
}

/// Parse the date and time arguments used by NEWGROUPS and NEWNEWS
/// as described in RFC 3977 Sections 7.3.1 and 7.4.1. Two-digit years are
/// accepted alongside four-digit ones.
pub fn parse_datetime(
    date: &str,
    time: &str,
    gmt: bool,
) -> Result<chrono::DateTime<chrono::Utc>, &'static str> {
    if !(date.len() == 6 || date.len() == 8) || !date.chars().all(|c| c.is_ascii_digit()) {
        return Err("invalid date");
    }
    if time.len() != 6 || !time.chars().all(|c| c.is_ascii_digit()) {
        return Err("invalid time");
    }
    let fmt = if date.len() == 6 { "%y%m%d" } else { "%Y%m%d" };
    let naive_date = chrono::NaiveDate::parse_from_str(date, fmt).map_err(|_| "invalid date")?;
    let naive_time =
        chrono::NaiveTime::parse_from_str(time, "%H%M%S").map_err(|_| "invalid time")?;
    let naive = naive_date.and_time(naive_time);
    Ok(if gmt {
        chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc)
    } else {
        chrono::Local
            .from_local_datetime(&naive)
            .single()
            .ok_or("invalid local time")?
            .with_timezone(&chrono::Utc)
    })
}

/// An article-number range: `N`, `N-` or `N-M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub lo: u64,
    /// `None` for the open-ended `N-` form.
    pub hi: Option<u64>,
}

impl Range {
    #[must_use]
    pub fn single(n: u64) -> Self {
        Self { lo: n, hi: Some(n) }
    }

    #[must_use]
    pub fn contains(&self, n: u64) -> bool {
        n >= self.lo && self.hi.is_none_or(|hi| n <= hi)
    }
}

/// Parse the range format used by LISTGROUP and OVER as defined in
/// RFC 3977 Section 6.1.2.
pub fn parse_range(spec: &str) -> Result<Range, &'static str> {
    let num = |s: &str| -> Result<u64, &'static str> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err("invalid range");
        }
        s.parse().map_err(|_| "invalid range")
    };
    match spec.split_once('-') {
        None => Ok(Range::single(num(spec)?)),
        Some((lo, "")) => Ok(Range {
            lo: num(lo)?,
            hi: None,
        }),
        Some((lo, hi)) => Ok(Range {
            lo: num(lo)?,
            hi: Some(num(hi)?),
        }),
    }
}
