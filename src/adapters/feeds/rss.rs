//! RSS Parser - Syndication XML to Articles
//!
//! Streams the document with `quick-xml` and never fails: an item with a
//! missing title, a non-http(s) link or an unparseable `pubDate` is
//! dropped on its own, and an XML syntax error ends the parse with the
//! items completed so far.
//!
//! Lead image lookup, first hit wins:
//! 1. `<enclosure url>` (image types only) or `<media:content url>`
//! 2. `<media:thumbnail url>`
//! 3. the first `<img src>` inside the description markup

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::{Captures, Regex};
use tracing::{debug, warn};
use url::Url;

use crate::domain::Article;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"));

static IMG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<img[^>]+src\s*=\s*["']([^"']+)["']"#).expect("img pattern is valid")
});

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"title" => Some(Self::Title),
            b"link" => Some(Self::Link),
            b"description" => Some(Self::Description),
            b"pubDate" => Some(Self::PubDate),
            _ => None,
        }
    }
}

/// Raw text collected for one `<item>`.
#[derive(Debug, Default)]
struct ItemDraft {
    title: String,
    link: String,
    description: String,
    pub_date: String,
    enclosure: Option<String>,
    thumbnail: Option<String>,
}

impl ItemDraft {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        };
        target.push_str(text);
    }

    fn note_media(&mut self, element: &BytesStart<'_>) {
        let Some(url) = attribute(element, "url") else {
            return;
        };
        match element.name().as_ref() {
            b"enclosure" => {
                let is_image = attribute(element, "type").is_none_or(|t| t.starts_with("image"));
                if is_image && self.enclosure.is_none() {
                    self.enclosure = Some(url);
                }
            }
            b"media:content" => {
                if self.enclosure.is_none() {
                    self.enclosure = Some(url);
                }
            }
            b"media:thumbnail" => {
                if self.thumbnail.is_none() {
                    self.thumbnail = Some(url);
                }
            }
            _ => {}
        }
    }

    fn finish(self, source_name: &str) -> Option<Article> {
        let title = strip_markup(&self.title);
        if title.is_empty() {
            return None;
        }

        let link = self.link.trim();
        let url = Url::parse(link).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        let published_at = parse_pub_date(&self.pub_date)?;

        let image_url = self
            .enclosure
            .or(self.thumbnail)
            .or_else(|| first_inline_image(&self.description))
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let description = Some(strip_markup(&self.description)).filter(|d| !d.is_empty());

        Some(Article {
            title,
            description,
            url: link.to_string(),
            image_url,
            published_at,
            source_name: source_name.to_string(),
        })
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    let attr = element.try_get_attribute(name).ok()??;
    let value = attr
        .unescape_value()
        .map_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned(), |v| v.into_owned());
    Some(value)
}

/// Parse an RFC-822 style date (`Tue, 10 Jun 2025 14:03:00 +0000`).
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `src` of the first `<img>` tag in an HTML fragment.
pub fn first_inline_image(html: &str) -> Option<String> {
    IMG_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()))
}

/// Remove tags, decode common entities and collapse whitespace.
pub fn strip_markup(html: &str) -> String {
    let without_tags = TAG_RE.replace_all(html, " ");
    let decoded = decode_entities(&without_tags);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map_or_else(
                        || entity.strip_prefix('#').and_then(|d| d.parse::<u32>().ok()),
                        |hex| u32::from_str_radix(hex, 16).ok(),
                    )
                    .and_then(char::from_u32),
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}

/// Parse an RSS document into articles tagged with `source_name`.
///
/// Document order is preserved; sorting happens when batches are merged.
pub fn parse(raw: &[u8], source_name: &str) -> Vec<Article> {
    let mut reader = Reader::from_reader(raw);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut articles = Vec::new();
    let mut draft: Option<ItemDraft> = None;
    let mut field: Option<Field> = None;
    let mut dropped = 0usize;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    source = source_name,
                    position = reader.buffer_position(),
                    error = %e,
                    "Malformed feed XML, keeping items parsed so far"
                );
                break;
            }
        };

        match event {
            Event::Start(e) => {
                if e.name().as_ref() == b"item" {
                    draft = Some(ItemDraft::default());
                    field = None;
                } else if let Some(item) = draft.as_mut() {
                    item.note_media(&e);
                    if let Some(f) = Field::from_name(e.name().as_ref()) {
                        field = Some(f);
                    }
                }
            }
            Event::Empty(e) => {
                if let Some(item) = draft.as_mut() {
                    item.note_media(&e);
                }
            }
            Event::Text(t) => {
                if let (Some(item), Some(f)) = (draft.as_mut(), field) {
                    let text = t
                        .unescape()
                        .map_or_else(|_| String::from_utf8_lossy(&t).into_owned(), |s| s.into_owned());
                    item.push(f, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(item), Some(f)) = (draft.as_mut(), field) {
                    item.push(f, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                let name = e.name();
                if name.as_ref() == b"item" {
                    if let Some(item) = draft.take() {
                        match item.finish(source_name) {
                            Some(article) => articles.push(article),
                            None => dropped += 1,
                        }
                    }
                    field = None;
                } else if Field::from_name(name.as_ref()).is_some() {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    debug!(
        source = source_name,
        parsed = articles.len(),
        dropped,
        "Feed parsed"
    );
    articles
}
