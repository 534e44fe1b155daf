//! User-facing messages for a comparison result.

use crate::pipeline::PipelineError;
use crate::types::{Comparison, Verdict};
use serde::Serialize;

pub const SAME_PERSON_MESSAGE: &str = "The two photos are of the same person";
pub const DIFFERENT_PERSONS_MESSAGE: &str = "The two photos are of two different persons";
pub const INVALID_UPLOAD_MESSAGE: &str = "Please upload valid photos having a face";

/// What the front end shows for one request.
///
/// Every pipeline failure collapses into [`Outcome::InvalidUpload`]; the
/// underlying error is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    SamePerson,
    DifferentPersons,
    InvalidUpload,
    /// Returned by a request-serving front end for routes it does not
    /// recognize, so they render an empty message instead of failing. Never
    /// produced by [`Outcome::from_result`].
    Empty,
}

impl Outcome {
    pub fn from_result(result: &Result<Comparison, PipelineError>) -> Self {
        match result {
            Ok(comparison) => comparison.verdict.into(),
            Err(err) => {
                tracing::warn!(error = %err, "comparison failed");
                Outcome::InvalidUpload
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Outcome::SamePerson => SAME_PERSON_MESSAGE,
            Outcome::DifferentPersons => DIFFERENT_PERSONS_MESSAGE,
            Outcome::InvalidUpload => INVALID_UPLOAD_MESSAGE,
            Outcome::Empty => "",
        }
    }

    /// True when the pipeline produced a verdict.
    pub fn is_verdict(&self) -> bool {
        matches!(self, Outcome::SamePerson | Outcome::DifferentPersons)
    }
}

impl From<Verdict> for Outcome {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::SamePerson => Outcome::SamePerson,
            Verdict::DifferentPersons => Outcome::DifferentPersons,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
