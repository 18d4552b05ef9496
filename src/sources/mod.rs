pub mod wikipedia;

use serde::Serialize;

pub use wikipedia::WikipediaSource;

/// A retrieved reference text and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDocument {
    pub identifier: String,
    pub body: String,
}

impl SourceDocument {
    pub fn new(identifier: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            body: body.into(),
        }
    }
}

/// An external knowledge source. Results come back in relevance order.
#[async_trait::async_trait]
pub trait DocumentSource: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SourceDocument>>;
    fn name(&self) -> &str;
}
