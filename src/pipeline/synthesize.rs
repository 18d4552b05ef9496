use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::llm::{GenerateRequest, LlmClient};
use crate::telemetry::metrics::REPORT_WORD_COUNT;

use super::{IndustryQuery, ModelConfig, PipelineSettings, SourceSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub text: String,
    pub word_count: usize,
}

impl Report {
    pub fn new(text: String) -> Self {
        let word_count = count_words(&text);
        Self { text, word_count }
    }

    pub fn within_limit(&self, limit: usize) -> bool {
        self.word_count <= limit
    }
}

/// Whitespace-delimited token count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

pub(crate) fn build_context(sources: &SourceSet) -> String {
    sources
        .documents()
        .iter()
        .map(|doc| doc.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(crate) fn system_prompt(word_limit: usize) -> String {
    format!(
        "You are a professional Business Analyst at a large corporation. \
        Your goal is to provide a concise market research report. \
        The report must be under {word_limit} words. \
        Use professional headings to structure the report. \
        Base your report ONLY on the provided reference data. \
        If the data does not answer something, say that you do not know rather than guessing."
    )
}

pub(crate) fn user_prompt(query: &IndustryQuery, context: &str, word_limit: usize) -> String {
    format!(
        "I am a business analyst conducting market research on the {query} industry.\n\n\
        Based ONLY on the reference data below, generate an industry report.\n\n\
        Reference data:\n{context}\n\n\
        Requirements:\n\
        1. The report must be less than {word_limit} words.\n\
        2. Use professional business language and headings.\n\
        3. Focus on key industry trends, major players, and market structure found in the text."
    )
}

fn condense_prompt(draft: &Report, word_limit: usize) -> String {
    format!(
        "The report below is {} words long. Rewrite it to under {word_limit} words. \
        Keep the headings and use only facts already present in it.\n\n{}",
        draft.word_count, draft.text
    )
}

#[tracing::instrument(
    name = "pipeline_stage synthesize",
    skip(llm_client, sources, model, settings),
    fields(
        pipeline.stage = "synthesize",
        industry = %query,
        report.sources = sources.len(),
        report.word_count,
        report.within_limit,
        report.reprompted = false,
    )
)]
pub async fn synthesize(
    llm_client: &LlmClient,
    query: &IndustryQuery,
    sources: &SourceSet,
    model: &ModelConfig,
    settings: &PipelineSettings,
) -> AppResult<Report> {
    let system = system_prompt(settings.word_limit);
    let context = build_context(sources);

    let request = GenerateRequest {
        model: model.model.clone(),
        system,
        prompt: user_prompt(query, &context, settings.word_limit),
        temperature: model.temperature,
        max_tokens: settings.report_max_tokens,
        stage: "synthesize".to_string(),
        api_key: model.api_key.clone(),
    };

    let resp = llm_client
        .generate(&request)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;
    let mut report = Report::new(resp.content);

    let span = tracing::Span::current();

    if settings.reprompt_on_overrun && !report.within_limit(settings.word_limit) {
        span.record("report.reprompted", true);
        tracing::info!(
            word_count = report.word_count,
            limit = settings.word_limit,
            "draft over word limit, asking for a condensed version"
        );

        let retry = GenerateRequest {
            prompt: condense_prompt(&report, settings.word_limit),
            stage: "synthesize_condense".to_string(),
            ..request
        };
        match llm_client.generate(&retry).await {
            Ok(resp) => {
                let condensed = Report::new(resp.content);
                if !condensed.text.trim().is_empty() && condensed.word_count < report.word_count {
                    report = condensed;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "condense retry failed, keeping first draft");
            }
        }
    }

    span.record("report.word_count", report.word_count);
    span.record("report.within_limit", report.within_limit(settings.word_limit));
    REPORT_WORD_COUNT.record(report.word_count as f64, &[]);

    Ok(report)
}
