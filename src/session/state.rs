use crate::pipeline::{IndustryQuery, Report, SourceSet, ValidationResult};

use super::phase::TransitionError;

/// Everything one report lifecycle has produced so far. Fields fill in pipeline
/// order and only `clear` empties them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    query: Option<IndustryQuery>,
    validation: Option<ValidationResult>,
    sources: Option<SourceSet>,
    report: Option<Report>,
}

impl SessionState {
    pub fn query(&self) -> Option<&IndustryQuery> {
        self.query.as_ref()
    }

    pub fn validation(&self) -> Option<&ValidationResult> {
        self.validation.as_ref()
    }

    pub fn sources(&self) -> Option<&SourceSet> {
        self.sources.as_ref()
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn begin(&mut self, query: IndustryQuery) -> Result<(), TransitionError> {
        if !self.is_empty() {
            return Err(TransitionError::OutOfOrder("query set on a used session"));
        }
        self.query = Some(query);
        Ok(())
    }

    pub fn record_validation(&mut self, result: ValidationResult) -> Result<(), TransitionError> {
        if self.query.is_none() || self.validation.is_some() {
            return Err(TransitionError::OutOfOrder(
                "validation requires a query and may be set once",
            ));
        }
        self.validation = Some(result);
        Ok(())
    }

    pub fn record_sources(&mut self, sources: SourceSet) -> Result<(), TransitionError> {
        if self.validation != Some(ValidationResult::Valid) || self.sources.is_some() {
            return Err(TransitionError::OutOfOrder(
                "sources require a valid industry and may be set once",
            ));
        }
        if sources.is_empty() {
            return Err(TransitionError::OutOfOrder("an empty source set is never stored"));
        }
        self.sources = Some(sources);
        Ok(())
    }

    pub fn record_report(&mut self, report: Report) -> Result<(), TransitionError> {
        if self.sources.is_none() || self.report.is_some() {
            return Err(TransitionError::OutOfOrder(
                "a report requires sources and may be set once",
            ));
        }
        self.report = Some(report);
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceDocument;

    fn query() -> IndustryQuery {
        IndustryQuery::parse("Fintech", 200).unwrap()
    }

    fn sources() -> SourceSet {
        SourceSet::from_documents(vec![SourceDocument::new("wiki/1", "body")], 5)
    }

    #[test]
    fn test_fills_in_order() {
        let mut state = SessionState::default();
        state.begin(query()).unwrap();
        state.record_validation(ValidationResult::Valid).unwrap();
        state.record_sources(sources()).unwrap();
        state.record_report(Report::new("a b c".to_string())).unwrap();
        assert_eq!(state.report().unwrap().word_count, 3);
        assert_eq!(state.query().unwrap().as_str(), "Fintech");
    }

    #[test]
    fn test_sources_refused_unless_valid() {
        let mut state = SessionState::default();
        assert!(state.record_sources(sources()).is_err());

        state.begin(query()).unwrap();
        state.record_validation(ValidationResult::Invalid).unwrap();
        assert!(state.record_sources(sources()).is_err());
        assert!(state.sources().is_none());
    }

    #[test]
    fn test_report_refused_without_sources() {
        let mut state = SessionState::default();
        state.begin(query()).unwrap();
        state.record_validation(ValidationResult::Valid).unwrap();
        assert!(state.record_report(Report::new("text".to_string())).is_err());
    }

    #[test]
    fn test_no_overwrites() {
        let mut state = SessionState::default();
        state.begin(query()).unwrap();
        assert!(state.begin(query()).is_err());
        state.record_validation(ValidationResult::Valid).unwrap();
        assert!(state.record_validation(ValidationResult::Invalid).is_err());
        assert_eq!(state.validation(), Some(&ValidationResult::Valid));
    }

    #[test]
    fn test_clear_returns_to_empty() {
        let mut state = SessionState::default();
        state.begin(query()).unwrap();
        state.record_validation(ValidationResult::Error("x".into())).unwrap();
        state.clear();
        assert!(state.is_empty());
        assert!(state.begin(query()).is_ok());
    }
}
