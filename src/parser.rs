//! RSS 2.0 / Atom extraction.
//!
//! Feeds in the wild are frequently malformed, so rather than running a
//! strict XML parser we scan for element blocks the same way for both
//! dialects: find `<item>` (or `<entry>`) blocks, then pull the few child
//! elements we care about out of each block. Parsing never fails; a body we
//! cannot make sense of simply produces no articles.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::models::Article;

/// Items taken from a single feed body before scanning stops.
pub const MAX_ITEMS_PER_FEED: usize = 20;

/// Summaries are hard-truncated to this many characters.
pub const SUMMARY_MAX_CHARS: usize = 180;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Rss,
    Atom,
}

impl Dialect {
    /// Sniffs the body: an Atom `<feed>` root with at least one `<entry>`
    /// is Atom, everything else is treated as RSS.
    pub fn detect(body: &str) -> Self {
        let lower = body.to_ascii_lowercase();
        let has_feed = find_open_tag(&lower, "feed", 0).is_some();
        let has_entry = find_open_tag(&lower, "entry", 0).is_some();
        if has_feed && has_entry {
            Dialect::Atom
        } else {
            Dialect::Rss
        }
    }
}

/// Parses a raw feed body into articles in document order.
pub fn parse_feed(body: &str, source: &str, tag: &str) -> Vec<Article> {
    match Dialect::detect(body) {
        Dialect::Atom => parse_atom(body, source, tag),
        Dialect::Rss => parse_rss(body, source, tag),
    }
}

pub fn parse_rss(body: &str, source: &str, tag: &str) -> Vec<Article> {
    collect_blocks(body, "item", |block, lower| {
        let title = cdata_value(block, lower, "title").or_else(|| plain_value(block, lower, "title"))?;
        let url = plain_value(block, lower, "link").or_else(|| plain_value(block, lower, "guid"));
        let description = cdata_value(block, lower, "description")
            .or_else(|| plain_value(block, lower, "description"));
        let date = plain_value(block, lower, "pubdate");

        build_article(title, url, description, date, source, tag)
    })
}

pub fn parse_atom(body: &str, source: &str, tag: &str) -> Vec<Article> {
    collect_blocks(body, "entry", |block, lower| {
        let title = cdata_value(block, lower, "title").or_else(|| plain_value(block, lower, "title"))?;
        let url = atom_link(block, lower);
        let summary = cdata_value(block, lower, "summary")
            .or_else(|| plain_value(block, lower, "summary"))
            .or_else(|| cdata_value(block, lower, "content"))
            .or_else(|| plain_value(block, lower, "content"));
        let date = plain_value(block, lower, "updated").or_else(|| plain_value(block, lower, "published"));

        build_article(title, url.as_deref(), summary, date, source, tag)
    })
}

fn build_article(
    title: &str,
    url: Option<&str>,
    summary: Option<&str>,
    date: Option<&str>,
    source: &str,
    tag: &str,
) -> Option<Article> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let date = date.map(str::trim).unwrap_or_default();

    Some(Article {
        title: title.to_string(),
        url: url.map(str::trim).unwrap_or_default().to_string(),
        summary: summarize(summary.unwrap_or_default()),
        date: date.to_string(),
        timestamp: parse_timestamp(date),
        source: source.to_string(),
        tag: tag.to_string(),
    })
}

/// Runs `extract` over every `<block_tag>` element, stopping once
/// [`MAX_ITEMS_PER_FEED`] articles have been produced.
fn collect_blocks<F>(body: &str, block_tag: &str, mut extract: F) -> Vec<Article>
where
    F: FnMut(&str, &str) -> Option<Article>,
{
    let lower = body.to_ascii_lowercase();
    let mut articles = Vec::new();

    for (start, end) in Blocks::new(&lower, block_tag) {
        if let Some(article) = extract(&body[start..end], &lower[start..end]) {
            articles.push(article);
        }
        if articles.len() >= MAX_ITEMS_PER_FEED {
            break;
        }
    }

    articles
}

/// Position of an opening tag within a lowercased document.
#[derive(Debug, Clone, Copy)]
struct OpenTag {
    start: usize,
    content_start: usize,
    self_closing: bool,
}

/// Finds `<tag` followed by `>`, `/` or whitespace at or after `from`.
///
/// `lower` must be ASCII-lowercased so byte offsets line up with the
/// unlowered input.
fn find_open_tag(lower: &str, tag: &str, from: usize) -> Option<OpenTag> {
    let needle = format!("<{}", tag);
    let mut pos = from;

    loop {
        let start = lower.get(pos..)?.find(&needle)? + pos;
        let after = start + needle.len();
        match lower.as_bytes().get(after) {
            Some(b'>') => {
                return Some(OpenTag {
                    start,
                    content_start: after + 1,
                    self_closing: false,
                })
            }
            Some(c) if c.is_ascii_whitespace() || *c == b'/' => {
                let close = lower[after..].find('>')? + after;
                return Some(OpenTag {
                    start,
                    content_start: close + 1,
                    self_closing: lower.as_bytes()[close - 1] == b'/',
                });
            }
            _ => pos = after,
        }
    }
}

/// Iterator over the inner byte ranges of every `<tag>...</tag>` block.
struct Blocks<'a> {
    lower: &'a str,
    tag: &'a str,
    close_tag: String,
    pos: usize,
}

impl<'a> Blocks<'a> {
    fn new(lower: &'a str, tag: &'a str) -> Self {
        Self {
            lower,
            tag,
            close_tag: format!("</{}>", tag),
            pos: 0,
        }
    }
}

impl Iterator for Blocks<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let open = find_open_tag(self.lower, self.tag, self.pos)?;
            if open.self_closing {
                self.pos = open.content_start;
                continue;
            }
            let end = self.lower[open.content_start..].find(&self.close_tag)? + open.content_start;
            self.pos = end + self.close_tag.len();
            return Some((open.content_start, end));
        }
    }
}

/// Inner text of the first `<tag>` element; empty content counts as absent.
fn plain_value<'a>(block: &'a str, lower: &str, tag: &str) -> Option<&'a str> {
    let (start, end) = Blocks::new(lower, tag).next()?;
    let inner = block[start..end].trim();
    let inner = unwrap_cdata(inner).unwrap_or(inner);
    (!inner.trim().is_empty()).then_some(inner)
}

/// Inner text of the first `<tag>` element whose content is a CDATA section.
fn cdata_value<'a>(block: &'a str, lower: &str, tag: &str) -> Option<&'a str> {
    Blocks::new(lower, tag)
        .filter_map(|(start, end)| unwrap_cdata(block[start..end].trim()))
        .find(|inner| !inner.is_empty())
}

fn unwrap_cdata(text: &str) -> Option<&str> {
    text.strip_prefix(CDATA_OPEN)?.strip_suffix(CDATA_CLOSE)
}

/// Picks the entry's alternate link, falling back to any link with an href.
fn atom_link(block: &str, lower: &str) -> Option<String> {
    let mut fallback = None;
    let mut pos = 0;

    while let Some(open) = find_open_tag(lower, "link", pos) {
        pos = open.content_start;
        let element = &block[open.start..open.content_start];
        let Some(href) = attribute(element, "href") else {
            continue;
        };
        match attribute(element, "rel") {
            None => return Some(href),
            Some(rel) if rel.eq_ignore_ascii_case("alternate") => return Some(href),
            Some(_) => {
                fallback.get_or_insert(href);
            }
        }
    }

    fallback
}

/// Reads a quoted attribute value out of an opening tag.
fn attribute(element: &str, name: &str) -> Option<String> {
    let lower = element.to_ascii_lowercase();
    let needle = format!("{}=", name);
    let mut pos = 0;

    while let Some(found) = lower[pos..].find(&needle) {
        let start = pos + found;
        pos = start + needle.len();

        let preceded_by_space = start > 0 && lower.as_bytes()[start - 1].is_ascii_whitespace();
        if !preceded_by_space {
            continue;
        }
        let quote = match element.as_bytes().get(pos) {
            Some(b'"') => '"',
            Some(b'\'') => '\'',
            _ => continue,
        };
        let value_start = pos + 1;
        let value_end = element[value_start..].find(quote)? + value_start;
        let value = element[value_start..value_end].trim();
        return (!value.is_empty()).then(|| value.to_string());
    }

    None
}

/// Markup-free, whitespace-collapsed, truncated summary text.
pub fn summarize(raw: &str) -> String {
    strip_markup(raw).chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Replaces tags and character references with spaces, then collapses
/// whitespace runs and trims.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find(['<', '&']) {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if tail.starts_with('<') {
            match tail.find('>') {
                Some(end) => {
                    out.push(' ');
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    rest = "";
                }
            }
        } else {
            match entity_len(tail) {
                Some(len) => {
                    out.push(' ');
                    rest = &tail[len..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            }
        }
    }
    out.push_str(rest);

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Byte length of a `&name;`, `&#NN;` or `&#xHH;` reference at the start of `text`.
fn entity_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix('&')?;
    let end = body.find(';')?;
    let name = &body[..end];

    let valid = match name.strip_prefix('#') {
        Some(numeric) => match numeric.strip_prefix('x').or_else(|| numeric.strip_prefix('X')) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !numeric.is_empty() && numeric.chars().all(|c| c.is_ascii_digit()),
        },
        None => {
            name.starts_with(|c: char| c.is_ascii_alphabetic())
                && name.chars().all(|c| c.is_ascii_alphanumeric())
        }
    };

    valid.then_some(end + 2)
}

/// Epoch milliseconds for a feed date string, 0 when it cannot be parsed.
pub fn parse_timestamp(raw: &str) -> i64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return dt.timestamp_millis();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.timestamp_millis();
    }
    if let Some(millis) = parse_loose_zoned(raw) {
        return millis;
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return naive.and_utc().timestamp_millis();
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
        .unwrap_or(0)
}

/// Zoned dates the strict parsers reject: a weekday that is spelled out or
/// does not match the date, `UTC`/`Z` zone names, full month names and
/// ISO offsets without a colon.
fn parse_loose_zoned(raw: &str) -> Option<i64> {
    let date = match raw.split_once(',') {
        Some((weekday, rest)) if weekday.trim().chars().all(|c| c.is_ascii_alphabetic()) => {
            rest.trim()
        }
        _ => raw,
    };
    let date = ["UTC", "GMT", "Z"]
        .iter()
        .find_map(|zone| date.strip_suffix(zone))
        .map_or_else(|| date.to_string(), |rest| format!("{} +0000", rest.trim_end()));

    if let Ok(dt) = DateTime::parse_from_rfc2822(&date) {
        return Some(dt.timestamp_millis());
    }
    [
        "%d %B %Y %H:%M:%S %z",
        "%d %B %Y %H:%M %z",
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%.f %z",
    ]
    .iter()
    .find_map(|format| DateTime::parse_from_str(&date, format).ok())
    .map(|dt| dt.timestamp_millis())
}
