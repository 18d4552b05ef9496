use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::pipeline::{
    Collection, IndustryQuery, ModelConfig, Pipeline, SourcePolicy, SourceSet, ValidationResult,
    collect, synthesize, validate,
};
use crate::telemetry::metrics::{REPORT_GENERATION_DURATION, SESSION_OUTCOMES};

use super::phase::{Event, Phase, TransitionError};
use super::state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Retrieval,
    Synthesis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ProviderError,
    NoSources,
    InsufficientSources,
}

/// Why a run ended in the `Error` phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub stage: Stage,
    pub message: String,
    pub hint: Option<String>,
}

impl Failure {
    fn provider(stage: Stage, err: &AppError) -> Self {
        Self {
            kind: FailureKind::ProviderError,
            stage,
            message: err.to_string(),
            hint: err.hint().map(str::to_string),
        }
    }

    fn no_sources(query: &IndustryQuery) -> Self {
        Self {
            kind: FailureKind::NoSources,
            stage: Stage::Retrieval,
            message: format!("No reference documents were found for '{query}'."),
            hint: Some("Try a broader or differently worded industry name.".to_string()),
        }
    }

    fn insufficient(found: usize, required: usize) -> Self {
        Self {
            kind: FailureKind::InsufficientSources,
            stage: Stage::Retrieval,
            message: format!("Only {found} of the {required} required reference documents were found."),
            hint: Some("Try a broader or differently worded industry name.".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    InsufficientSources { found: usize, required: usize },
    LengthExceeded { word_count: usize, limit: usize },
}

impl Warning {
    pub fn message(&self) -> String {
        match self {
            Warning::InsufficientSources { found, required } => format!(
                "Only {found} of {required} sources were found; the report rests on limited data."
            ),
            Warning::LengthExceeded { word_count, limit } => {
                format!("The report is {word_count} words, over the {limit}-word limit.")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarningView {
    #[serde(flatten)]
    pub warning: Warning,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub text: String,
    pub word_count: usize,
    pub word_limit: usize,
    pub within_limit: bool,
}

/// Everything the user-facing surface renders for one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub phase: Phase,
    pub query: Option<String>,
    pub validation: Option<ValidationResult>,
    pub sources: Vec<String>,
    pub report: Option<ReportView>,
    pub warnings: Vec<WarningView>,
    pub error: Option<Failure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct Inner {
    phase: Phase,
    state: SessionState,
    warnings: Vec<Warning>,
    failure: Option<Failure>,
    generation: u64,
    run_started: Option<Instant>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Inner {
    /// Moves to the next phase and applies the matching state write together.
    /// Nothing changes if either is refused.
    fn transition<F>(&mut self, event: Event, write: F) -> Result<(), TransitionError>
    where
        F: FnOnce(&mut SessionState) -> Result<(), TransitionError>,
    {
        let next = self.phase.apply(event)?;
        write(&mut self.state)?;
        self.phase = next;
        self.updated_at = Utc::now();

        if next.is_terminal() {
            SESSION_OUTCOMES.add(1, &[KeyValue::new("session.phase", next.as_str())]);
            if let Some(started) = self.run_started {
                REPORT_GENERATION_DURATION.record(
                    started.elapsed().as_secs_f64(),
                    &[KeyValue::new("session.phase", next.as_str())],
                );
            }
        }
        Ok(())
    }

    fn fail(&mut self, failure: Failure) -> Result<(), TransitionError> {
        self.transition(Event::Fail, |_| Ok(()))?;
        tracing::warn!(
            stage = ?failure.stage,
            kind = ?failure.kind,
            error = %failure.message,
            "run halted"
        );
        self.failure = Some(failure);
        Ok(())
    }
}

/// Drives one user's validate → collect → synthesize lifecycle.
///
/// Each phase change and its state write happen under a single lock
/// acquisition. The lock is never held across a collaborator call; results
/// are committed against the run generation they were started under, so a
/// reset in the meantime discards them.
pub struct SessionController {
    id: Uuid,
    pipeline: Pipeline,
    inner: Mutex<Inner>,
    last_activity_ms: AtomicI64,
}

impl SessionController {
    pub fn new(pipeline: Pipeline) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            pipeline,
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                state: SessionState::default(),
                warnings: Vec::new(),
                failure: None,
                generation: 0,
                run_started: None,
                created_at: now,
                updated_at: now,
            }),
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub async fn phase(&self) -> Phase {
        self.inner.lock().await.phase
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        self.snapshot_of(&inner)
    }

    fn snapshot_of(&self, inner: &Inner) -> SessionSnapshot {
        let word_limit = self.pipeline.settings.word_limit;
        SessionSnapshot {
            id: self.id,
            phase: inner.phase,
            query: inner.state.query().map(|q| q.as_str().to_string()),
            validation: inner.state.validation().cloned(),
            sources: inner
                .state
                .sources()
                .map(SourceSet::identifiers)
                .unwrap_or_default(),
            report: inner.state.report().map(|r| ReportView {
                text: r.text.clone(),
                word_count: r.word_count,
                word_limit,
                within_limit: r.within_limit(word_limit),
            }),
            warnings: inner
                .warnings
                .iter()
                .map(|w| WarningView {
                    warning: w.clone(),
                    message: w.message(),
                })
                .collect(),
            error: inner.failure.clone(),
            created_at: inner.created_at,
            updated_at: inner.updated_at,
        }
    }

    /// Clears everything and returns to `Idle`. A run still in flight is abandoned.
    #[tracing::instrument(name = "session.reset", skip(self), fields(session.id = %self.id))]
    pub async fn reset(&self) -> SessionSnapshot {
        self.touch();
        let mut inner = self.inner.lock().await;
        inner.phase = match inner.phase.apply(Event::Reset) {
            Ok(next) => next,
            Err(_) => {
                tracing::info!(phase = inner.phase.as_str(), "reset abandons the in-flight run");
                Phase::Idle
            }
        };
        inner.generation += 1;
        inner.state.clear();
        inner.warnings.clear();
        inner.failure = None;
        inner.run_started = None;
        inner.updated_at = Utc::now();
        self.snapshot_of(&inner)
    }

    async fn commit<T, F>(&self, generation: u64, f: F) -> AppResult<Option<T>>
    where
        F: FnOnce(&mut Inner) -> Result<T, TransitionError>,
    {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            tracing::info!(session.id = %self.id, "discarding result of an abandoned run");
            return Ok(None);
        }
        Ok(Some(f(&mut inner)?))
    }

    /// Runs the whole pipeline for `raw_query`.
    ///
    /// Input problems leave the session in `Idle` and come back as
    /// `AppError::Input`; a second submit during a run is `AppError::Busy`.
    /// Stage failures are not errors here: they end the run in `Rejected` or
    /// `Error` and show up in the returned snapshot.
    ///
    /// The stages run on their own task, so a caller that goes away mid-run
    /// does not strand the session in a working phase.
    #[tracing::instrument(
        name = "session.submit",
        skip(self, raw_query, model),
        fields(session.id = %self.id, session.phase)
    )]
    pub async fn submit(
        self: &Arc<Self>,
        raw_query: &str,
        model: ModelConfig,
    ) -> AppResult<SessionSnapshot> {
        self.touch();
        let settings = &self.pipeline.settings;

        let (query, generation) = {
            let mut inner = self.inner.lock().await;
            if inner.phase.is_running() {
                return Err(AppError::Busy(
                    "A report is already being generated for this session.".to_string(),
                ));
            }
            if inner.phase.is_terminal() {
                return Err(AppError::Input(
                    "Reset the session before submitting another industry.".to_string(),
                ));
            }

            let query = IndustryQuery::parse(raw_query, settings.max_query_chars)?;
            model.check(&settings.allowed_models)?;

            inner.transition(Event::Submit, |state| state.begin(query.clone()))?;
            inner.generation += 1;
            inner.run_started = Some(Instant::now());
            inner.warnings.clear();
            inner.failure = None;
            (query, inner.generation)
        };

        let session = Arc::clone(self);
        let run = tokio::spawn(
            async move { session.run(query, generation, model).await }
                .instrument(tracing::Span::current()),
        );
        run.await
            .map_err(|e| AppError::Internal(format!("report run aborted: {e}")))??;

        let snapshot = self.finish(generation).await;
        tracing::Span::current().record("session.phase", snapshot.phase.as_str());
        Ok(snapshot)
    }

    /// The session as the run `generation` left it. A run that was abandoned by
    /// a reset sees the cleared session, never a later run's results.
    async fn finish(&self, generation: u64) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        if inner.generation == generation {
            return self.snapshot_of(&inner);
        }
        SessionSnapshot {
            id: self.id,
            phase: Phase::Idle,
            query: None,
            validation: None,
            sources: Vec::new(),
            report: None,
            warnings: Vec::new(),
            error: None,
            created_at: inner.created_at,
            updated_at: inner.updated_at,
        }
    }

    async fn run(
        &self,
        query: IndustryQuery,
        generation: u64,
        model: ModelConfig,
    ) -> AppResult<()> {
        let settings = &self.pipeline.settings;

        let validation = validate(
            &self.pipeline.llm,
            &query,
            &model,
            settings.validation_max_tokens,
        )
        .await;
        let valid = self
            .commit(generation, |inner| {
                let event = match &validation {
                    ValidationResult::Valid => Event::Valid,
                    ValidationResult::Invalid => Event::Invalid,
                    ValidationResult::Error(_) => Event::Fail,
                };
                inner.transition(event, |state| state.record_validation(validation.clone()))?;
                if let ValidationResult::Error(message) = &validation {
                    inner.failure = Some(Failure::provider(
                        Stage::Validation,
                        &AppError::Llm(message.clone()),
                    ));
                }
                Ok(validation == ValidationResult::Valid)
            })
            .await?;
        if valid != Some(true) {
            return Ok(());
        }

        let started = self
            .commit(generation, |inner| {
                inner.transition(Event::StartRetrieval, |_| Ok(()))
            })
            .await?;
        if started.is_none() {
            return Ok(());
        }

        let collected = collect(self.pipeline.source.as_ref(), &query, settings.max_sources).await;
        let sources = self
            .commit(generation, |inner| match collected {
                Err(err) => {
                    inner.fail(Failure::provider(Stage::Retrieval, &err))?;
                    Ok(None)
                }
                Ok(Collection::NoSources) => {
                    inner.fail(Failure::no_sources(&query))?;
                    Ok(None)
                }
                Ok(Collection::Insufficient { sources, required })
                    if settings.source_policy == SourcePolicy::Strict =>
                {
                    inner.fail(Failure::insufficient(sources.len(), required))?;
                    Ok(None)
                }
                Ok(Collection::Insufficient { sources, required }) => {
                    let found = sources.len();
                    inner.transition(Event::SourcesFound, |state| {
                        state.record_sources(sources.clone())
                    })?;
                    inner
                        .warnings
                        .push(Warning::InsufficientSources { found, required });
                    Ok(Some(sources))
                }
                Ok(Collection::Sufficient(sources)) => {
                    inner.transition(Event::SourcesFound, |state| {
                        state.record_sources(sources.clone())
                    })?;
                    Ok(Some(sources))
                }
            })
            .await?
            .flatten();
        let Some(sources) = sources else {
            return Ok(());
        };

        let started = self
            .commit(generation, |inner| {
                inner.transition(Event::StartSynthesis, |_| Ok(()))
            })
            .await?;
        if started.is_none() {
            return Ok(());
        }

        let synthesized = synthesize(&self.pipeline.llm, &query, &sources, &model, settings).await;
        self.commit(generation, |inner| match synthesized {
            Ok(report) => {
                let word_count = report.word_count;
                let within_limit = report.within_limit(settings.word_limit);
                inner.transition(Event::ReportReady, |state| state.record_report(report))?;
                if !within_limit {
                    inner.warnings.push(Warning::LengthExceeded {
                        word_count,
                        limit: settings.word_limit,
                    });
                }
                Ok(())
            }
            Err(err) => inner.fail(Failure::provider(Stage::Synthesis, &err)),
        })
        .await?;

        Ok(())
    }
}
