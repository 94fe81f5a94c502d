//! Per-source raw payload extraction.
//!
//! Each ingestion source ships a differently-shaped JSON payload. Rather
//! than scattering untyped field lookups through the repair job, every
//! source gets its own serde struct and extraction method behind one
//! tagged union, plus a generic fallback for unrecognized sources.
//! Extraction degrades gracefully: absent payload fields fall back to a
//! source-specific default URL built from the external id, or stay unset.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;

/// The normalized fields relation repair derives from a raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFields {
    pub title: String,
    pub abstract_text: Option<String>,
    /// Empty string when no URL could be derived — the caller skips such
    /// records.
    pub source_url: String,
    pub authors: Option<Vec<String>>,
    pub published_at: Option<DateTime<Utc>>,
}

/// An author entry that may be a plain string or an object with a `name`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AuthorRef {
    Name(String),
    Object { name: Option<String> },
}

impl AuthorRef {
    fn name(&self) -> Option<String> {
        match self {
            AuthorRef::Name(name) => Some(name.clone()),
            AuthorRef::Object { name } => name.clone(),
        }
    }
}

fn author_names(authors: &Option<Vec<AuthorRef>>) -> Option<Vec<String>> {
    let names: Vec<String> = authors.as_ref()?.iter().filter_map(AuthorRef::name).collect();
    (!names.is_empty()).then_some(names)
}

/// Best-effort timestamp parsing across the formats sources actually emit:
/// RFC 3339 (arXiv, GitHub, YouTube), RFC 2822 (RSS `pubDate`), bare dates.
fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

fn parse_datetime_opt(raw: &Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().and_then(parse_datetime)
}

/// Build a source's default URL from the external id, or `""` when there is
/// no id to build from.
fn default_url(prefix: &str, external_id: Option<&str>) -> String {
    match external_id {
        Some(id) => format!("{prefix}{id}"),
        None => String::new(),
    }
}

// --- Per-source payload shapes ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArxivPayload {
    title: Option<String>,
    summary: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    link: Option<String>,
    authors: Option<Vec<AuthorRef>>,
    published: Option<String>,
}

impl ArxivPayload {
    fn extract(&self, external_id: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            title: self
                .title
                .clone()
                .unwrap_or_else(|| "Untitled Paper".to_string()),
            abstract_text: self.summary.clone().or_else(|| self.abstract_text.clone()),
            source_url: self
                .link
                .clone()
                .unwrap_or_else(|| default_url("https://arxiv.org/abs/", external_id)),
            authors: author_names(&self.authors),
            published_at: parse_datetime_opt(&self.published),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubPayload {
    full_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
    html_url: Option<String>,
    owner: Option<GithubOwner>,
    created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubOwner {
    login: Option<String>,
}

impl GithubPayload {
    fn extract(&self, external_id: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            title: self
                .full_name
                .clone()
                .or_else(|| self.name.clone())
                .unwrap_or_else(|| "Untitled Project".to_string()),
            abstract_text: self.description.clone(),
            source_url: self
                .html_url
                .clone()
                .unwrap_or_else(|| default_url("https://github.com/", external_id)),
            authors: self
                .owner
                .as_ref()
                .and_then(|o| o.login.clone())
                .map(|login| vec![login]),
            published_at: parse_datetime_opt(&self.created_at),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HackerNewsPayload {
    title: Option<String>,
    text: Option<String>,
    url: Option<String>,
    by: Option<String>,
    /// Unix epoch seconds.
    time: Option<i64>,
}

impl HackerNewsPayload {
    fn extract(&self, external_id: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            title: self.title.clone().unwrap_or_else(|| "Untitled".to_string()),
            abstract_text: self.text.clone(),
            source_url: self.url.clone().unwrap_or_else(|| {
                default_url("https://news.ycombinator.com/item?id=", external_id)
            }),
            authors: self.by.clone().map(|by| vec![by]),
            published_at: self.time.and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YoutubePayload {
    title: Option<String>,
    description: Option<String>,
    url: Option<String>,
    #[serde(rename = "channelTitle")]
    channel_title: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    snippet: Option<YoutubeSnippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct YoutubeSnippet {
    title: Option<String>,
    description: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
}

impl YoutubePayload {
    fn extract(&self, external_id: Option<&str>) -> ExtractedFields {
        let snippet = self.snippet.as_ref();
        ExtractedFields {
            title: self
                .title
                .clone()
                .or_else(|| snippet.and_then(|s| s.title.clone()))
                .unwrap_or_else(|| "Untitled Video".to_string()),
            abstract_text: self
                .description
                .clone()
                .or_else(|| snippet.and_then(|s| s.description.clone())),
            source_url: self
                .url
                .clone()
                .unwrap_or_else(|| default_url("https://www.youtube.com/watch?v=", external_id)),
            authors: self.channel_title.clone().map(|c| vec![c]),
            published_at: parse_datetime_opt(&self.published_at)
                .or_else(|| snippet.and_then(|s| parse_datetime_opt(&s.published_at))),
        }
    }
}

/// RSS / blog family: rss, blog, medium, devto.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedPayload {
    title: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    content: Option<String>,
    link: Option<String>,
    url: Option<String>,
    author: Option<String>,
    authors: Option<Vec<AuthorRef>>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    published: Option<String>,
}

impl FeedPayload {
    fn extract(&self, _external_id: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            title: self.title.clone().unwrap_or_else(|| "Untitled".to_string()),
            abstract_text: self
                .summary
                .clone()
                .or_else(|| self.description.clone())
                .or_else(|| {
                    self.content
                        .as_ref()
                        .map(|c| c.chars().take(500).collect())
                }),
            source_url: self
                .link
                .clone()
                .or_else(|| self.url.clone())
                .unwrap_or_default(),
            authors: self
                .author
                .clone()
                .map(|a| vec![a])
                .or_else(|| author_names(&self.authors)),
            published_at: parse_datetime_opt(&self.pub_date)
                .or_else(|| parse_datetime_opt(&self.published)),
        }
    }
}

/// Fallback mapping for sources with no dedicated shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericPayload {
    title: Option<String>,
    name: Option<String>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    url: Option<String>,
    link: Option<String>,
    #[serde(rename = "sourceUrl")]
    source_url: Option<String>,
    authors: Option<Vec<AuthorRef>>,
    author: Option<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    published: Option<String>,
    #[serde(rename = "createdAt")]
    created_at: Option<String>,
}

impl GenericPayload {
    fn extract(&self, _external_id: Option<&str>) -> ExtractedFields {
        ExtractedFields {
            title: self
                .title
                .clone()
                .or_else(|| self.name.clone())
                .unwrap_or_else(|| "Untitled".to_string()),
            abstract_text: self
                .abstract_text
                .clone()
                .or_else(|| self.summary.clone())
                .or_else(|| self.description.clone()),
            source_url: self
                .url
                .clone()
                .or_else(|| self.link.clone())
                .or_else(|| self.source_url.clone())
                .unwrap_or_default(),
            authors: author_names(&self.authors)
                .or_else(|| self.author.clone().map(|a| vec![a])),
            published_at: parse_datetime_opt(&self.published_at)
                .or_else(|| parse_datetime_opt(&self.published))
                .or_else(|| parse_datetime_opt(&self.created_at)),
        }
    }
}

// --- Tagged union ---

/// A raw payload interpreted according to its ingestion source.
#[derive(Debug, Clone)]
pub enum SourcePayload {
    Arxiv(ArxivPayload),
    Github(GithubPayload),
    HackerNews(HackerNewsPayload),
    Youtube(YoutubePayload),
    Feed(FeedPayload),
    Generic(GenericPayload),
}

impl SourcePayload {
    /// Pick the shape for a source and deserialize the payload into it.
    /// Malformed payloads collapse to the shape's default (all fields
    /// absent) — extraction still succeeds with fallback values.
    pub fn parse(source: &str, data: &Value) -> Self {
        fn shape<T: Default + for<'de> Deserialize<'de>>(data: &Value) -> T {
            serde_json::from_value(data.clone()).unwrap_or_default()
        }

        match source.to_lowercase().as_str() {
            "arxiv" => SourcePayload::Arxiv(shape(data)),
            "github" => SourcePayload::Github(shape(data)),
            "hackernews" | "hn" => SourcePayload::HackerNews(shape(data)),
            "youtube" => SourcePayload::Youtube(shape(data)),
            "rss" | "blog" | "medium" | "devto" => SourcePayload::Feed(shape(data)),
            _ => SourcePayload::Generic(shape(data)),
        }
    }

    pub fn extract(&self, external_id: Option<&str>) -> ExtractedFields {
        match self {
            SourcePayload::Arxiv(p) => p.extract(external_id),
            SourcePayload::Github(p) => p.extract(external_id),
            SourcePayload::HackerNews(p) => p.extract(external_id),
            SourcePayload::Youtube(p) => p.extract(external_id),
            SourcePayload::Feed(p) => p.extract(external_id),
            SourcePayload::Generic(p) => p.extract(external_id),
        }
    }
}
