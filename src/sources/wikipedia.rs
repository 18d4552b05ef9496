use std::time::Duration;

use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::{DocumentSource, SourceDocument};

const USER_AGENT: &str = concat!(
    "industry-report-assistant/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/industry-report-assistant)"
);

#[derive(Debug, Clone)]
pub struct WikipediaSettings {
    pub lang: String,
    pub results: u32,
    pub doc_max_chars: usize,
    pub timeout: Duration,
}

/// Searches Wikipedia and loads the plain-text body of each hit.
pub struct WikipediaSource {
    client: reqwest::Client,
    endpoint: String,
    settings: WikipediaSettings,
}

impl WikipediaSource {
    pub fn new(settings: WikipediaSettings) -> anyhow::Result<Self> {
        let endpoint = format!("https://{}.wikipedia.org/w/api.php", settings.lang);
        Self::with_endpoint(endpoint, settings)
    }

    pub fn with_endpoint(endpoint: String, settings: WikipediaSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build Wikipedia HTTP client: {e}"))?;

        Ok(Self {
            client,
            endpoint,
            settings,
        })
    }

    /// `query` must already be sanitized.
    async fn search_titles(&self, query: &str) -> anyhow::Result<Vec<String>> {
        let limit = self.settings.results.to_string();
        let body: ApiResponse<SearchQuery> = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("formatversion", "2"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_search(body)
    }
}

#[async_trait::async_trait]
impl DocumentSource for WikipediaSource {
    #[tracing::instrument(
        name = "source.search",
        skip(self),
        fields(source.name = "wikipedia", source.hits, source.documents)
    )]
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SourceDocument>> {
        if query.trim().is_empty() {
            anyhow::bail!("refusing to search Wikipedia with an empty query");
        }

        let terms = sanitize_search(query);
        if terms.is_empty() {
            tracing::info!(query, "query has no searchable terms left");
            return Ok(Vec::new());
        }

        let titles = self.search_titles(&terms).await?;
        tracing::Span::current().record("source.hits", titles.len());

        let mut pages = JoinSet::new();
        for (index, title) in titles.into_iter().enumerate() {
            let client = self.client.clone();
            let endpoint = self.endpoint.clone();
            let span = tracing::debug_span!("source.load_page", page.title = %title);
            pages.spawn(
                async move {
                    let page = load_page(&client, &endpoint, &title).await;
                    (index, title, page)
                }
                .instrument(span),
            );
        }

        // A failed page is skipped; the search only fails when no page loaded at all.
        let mut loaded = Vec::new();
        let mut first_error = None;
        while let Some(joined) = pages.join_next().await {
            let (index, title, page) =
                joined.map_err(|e| anyhow::anyhow!("page loader task failed: {e}"))?;
            match page {
                Ok(Some(page)) => loaded.push((index, page)),
                Ok(None) => tracing::debug!(page.title = %title, "search hit has no page body"),
                Err(e) => {
                    tracing::warn!(page.title = %title, error = %e, "skipping page that failed to load");
                    first_error.get_or_insert(e);
                }
            }
        }
        if loaded.is_empty()
            && let Some(err) = first_error
        {
            return Err(err.context("no Wikipedia page could be loaded"));
        }
        loaded.sort_by_key(|(index, _)| *index);

        let documents: Vec<SourceDocument> = loaded
            .into_iter()
            .map(|(_, page)| page.into_document(self.settings.doc_max_chars))
            .collect();

        tracing::Span::current().record("source.documents", documents.len());
        Ok(documents)
    }

    fn name(&self) -> &str {
        "wikipedia"
    }
}

async fn load_page(
    client: &reqwest::Client,
    endpoint: &str,
    title: &str,
) -> anyhow::Result<Option<Page>> {
    let body: ApiResponse<PagesQuery> = client
        .get(endpoint)
        .query(&[
            ("action", "query"),
            ("format", "json"),
            ("formatversion", "2"),
            ("prop", "extracts|info"),
            ("inprop", "url"),
            ("explaintext", "1"),
            ("redirects", "1"),
            ("titles", title),
        ])
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    parse_page(body)
}

#[derive(Debug, Deserialize)]
struct ApiResponse<Q> {
    query: Option<Q>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Debug, Deserialize)]
struct PagesQuery {
    #[serde(default)]
    pages: Vec<Page>,
}

#[derive(Debug, Deserialize)]
struct Page {
    title: String,
    #[serde(default)]
    missing: bool,
    fullurl: Option<String>,
    extract: Option<String>,
}

impl Page {
    fn into_document(self, max_chars: usize) -> SourceDocument {
        let identifier = self.fullurl.unwrap_or_else(|| {
            format!("https://en.wikipedia.org/wiki/{}", self.title.replace(' ', "_"))
        });
        let body = truncate_chars(self.extract.unwrap_or_default().trim(), max_chars);
        SourceDocument { identifier, body }
    }
}

fn api_error<Q>(body: &ApiResponse<Q>) -> Option<anyhow::Error> {
    body.error
        .as_ref()
        .map(|e| anyhow::anyhow!("Wikipedia API error ({}): {}", e.code, e.info))
}

fn parse_search(body: ApiResponse<SearchQuery>) -> anyhow::Result<Vec<String>> {
    if let Some(err) = api_error(&body) {
        return Err(err);
    }
    Ok(body
        .query
        .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
        .unwrap_or_default())
}

fn parse_page(body: ApiResponse<PagesQuery>) -> anyhow::Result<Option<Page>> {
    if let Some(err) = api_error(&body) {
        return Err(err);
    }
    Ok(body.query.and_then(|q| {
        q.pages.into_iter().find(|page| {
            !page.missing && page.extract.as_deref().is_some_and(|e| !e.trim().is_empty())
        })
    }))
}

/// Search keywords CirrusSearch treats as filters rather than text.
const SEARCH_KEYWORDS: &[&str] = &[
    "intitle",
    "insource",
    "incategory",
    "deepcat",
    "hastemplate",
    "linksto",
    "prefix",
    "morelike",
    "neartitle",
    "nearcoord",
    "subpageof",
    "articletopic",
    "inlanguage",
    "contentmodel",
    "pageid",
    "filetype",
    "filemime",
    "filesize",
];

fn is_search_operator(c: char) -> bool {
    matches!(
        c,
        '"' | '\\' | '/' | '~' | '*' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '|' | ':'
    )
}

/// Reduces free text to plain search terms: keyword filters, regex delimiters,
/// negation prefixes, fuzziness suffixes and boolean operators are removed so
/// CirrusSearch treats every remaining word as text.
pub(crate) fn sanitize_search(query: &str) -> String {
    let mut terms = Vec::new();
    for token in query.split_whitespace() {
        let token = token.trim_start_matches(['-', '!']);
        let token = match token.split_once(':') {
            Some((key, rest)) if SEARCH_KEYWORDS.contains(&key.to_ascii_lowercase().as_str()) => {
                rest
            }
            _ => token,
        };
        for piece in token.split(is_search_operator) {
            let piece = piece.trim_start_matches(['-', '!']);
            match piece {
                "" => {}
                "AND" | "OR" | "NOT" => terms.push(piece.to_ascii_lowercase()),
                _ => terms.push(piece.to_string()),
            }
        }
    }
    terms.join(" ")
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s.to_string(),
    }
}
