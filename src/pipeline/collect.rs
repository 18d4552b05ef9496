use std::collections::HashSet;

use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::sources::{DocumentSource, SourceDocument};
use crate::telemetry::metrics::REPORT_SOURCES;

use super::IndustryQuery;

/// Ordered reference documents from a single search, unique by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SourceSet(Vec<SourceDocument>);

impl SourceSet {
    /// Keeps source order, drops repeated identifiers and stops at `max`.
    pub fn from_documents(documents: Vec<SourceDocument>, max: usize) -> Self {
        let mut seen = HashSet::new();
        let unique = documents
            .into_iter()
            .filter(|doc| seen.insert(doc.identifier.clone()))
            .take(max)
            .collect();
        Self(unique)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn documents(&self) -> &[SourceDocument] {
        &self.0
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.0.iter().map(|d| d.identifier.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    Sufficient(SourceSet),
    Insufficient { sources: SourceSet, required: usize },
    NoSources,
}

#[tracing::instrument(
    name = "pipeline_stage collect",
    skip(source, max_sources),
    fields(
        pipeline.stage = "collect",
        source.name = source.name(),
        source.returned,
        source.kept,
    )
)]
pub async fn collect(
    source: &dyn DocumentSource,
    query: &IndustryQuery,
    max_sources: usize,
) -> AppResult<Collection> {
    let documents = source
        .search(query.as_str())
        .await
        .map_err(|e| AppError::Source(e.to_string()))?;

    let returned = documents.len();
    let sources = SourceSet::from_documents(documents, max_sources);

    let span = tracing::Span::current();
    span.record("source.returned", returned);
    span.record("source.kept", sources.len());
    REPORT_SOURCES.record(sources.len() as f64, &[]);

    Ok(if sources.is_empty() {
        Collection::NoSources
    } else if sources.len() < max_sources {
        tracing::warn!(
            found = sources.len(),
            required = max_sources,
            "fewer sources than required"
        );
        Collection::Insufficient {
            sources,
            required: max_sources,
        }
    } else {
        Collection::Sufficient(sources)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedSource {
        documents: Vec<SourceDocument>,
        queries: Mutex<Vec<String>>,
    }

    impl FixedSource {
        fn new(documents: Vec<SourceDocument>) -> Self {
            Self {
                documents,
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl DocumentSource for FixedSource {
        async fn search(&self, query: &str) -> anyhow::Result<Vec<SourceDocument>> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.documents.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DownSource;

    #[async_trait::async_trait]
    impl DocumentSource for DownSource {
        async fn search(&self, _query: &str) -> anyhow::Result<Vec<SourceDocument>> {
            anyhow::bail!("connection refused")
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn docs(ids: &[&str]) -> Vec<SourceDocument> {
        ids.iter()
            .map(|id| SourceDocument::new(*id, format!("body of {id}")))
            .collect()
    }

    #[test]
    fn test_source_set_truncates_from_front() {
        let set = SourceSet::from_documents(docs(&["a", "b", "c", "d", "e", "f", "g"]), 5);
        assert_eq!(set.identifiers(), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_source_set_dedupes_keeping_first() {
        let mut input = docs(&["a", "b", "a", "c", "b", "d", "e", "f"]);
        input[2].body = "second copy".to_string();
        let set = SourceSet::from_documents(input, 5);
        assert_eq!(set.identifiers(), vec!["a", "b", "c", "d", "e"]);
        assert_eq!(set.documents()[0].body, "body of a");
    }

    #[tokio::test]
    async fn test_collect_sends_trimmed_query_once() {
        let source = FixedSource::new(docs(&["a", "b", "c", "d", "e"]));
        let query = IndustryQuery::parse("  Renewable Energy  ", 200).unwrap();

        let collection = collect(&source, &query, 5).await.unwrap();
        assert!(matches!(collection, Collection::Sufficient(ref s) if s.len() == 5));
        assert_eq!(*source.queries.lock().unwrap(), vec!["Renewable Energy"]);
    }

    #[tokio::test]
    async fn test_collect_insufficient() {
        let source = FixedSource::new(docs(&["a", "b", "a"]));
        let query = IndustryQuery::parse("Fintech", 200).unwrap();

        match collect(&source, &query, 5).await.unwrap() {
            Collection::Insufficient { sources, required } => {
                assert_eq!(sources.identifiers(), vec!["a", "b"]);
                assert_eq!(required, 5);
            }
            other => panic!("expected insufficient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_collect_no_sources() {
        let source = FixedSource::new(vec![]);
        let query = IndustryQuery::parse("Fintech", 200).unwrap();
        assert_eq!(
            collect(&source, &query, 5).await.unwrap(),
            Collection::NoSources
        );
    }

    #[tokio::test]
    async fn test_collect_source_error() {
        let query = IndustryQuery::parse("Fintech", 200).unwrap();
        let err = collect(&DownSource, &query, 5).await.unwrap_err();
        assert!(matches!(err, AppError::Source(ref m) if m.contains("connection refused")));
    }
}
