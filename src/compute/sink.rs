//! Result consumers.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, PathError};
use crate::paths::path::Path;

pub type SourceId = u64;
pub type ReceiverId = u64;

/// What came out of one pair.
#[derive(Debug)]
pub enum PairOutcome {
    Paths {
        paths: Vec<Path>,
        warnings: Vec<GeometryError>,
    },
    Failed(PathError),
}

#[derive(Debug)]
pub struct PairResult {
    pub source_id: SourceId,
    pub receiver_id: ReceiverId,
    pub outcome: PairOutcome,
}

impl PairResult {
    pub fn paths(&self) -> &[Path] {
        match &self.outcome {
            PairOutcome::Paths { paths, .. } => paths,
            PairOutcome::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, PairOutcome::Failed(_))
    }
}

/// Paths of a pair in a serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRecord {
    pub source_id: SourceId,
    pub receiver_id: ReceiverId,
    pub paths: Vec<Path>,
    /// Failure message, when the pair failed.
    pub error: Option<String>,
}

impl From<&PairResult> for PairRecord {
    fn from(result: &PairResult) -> Self {
        let error = match &result.outcome {
            PairOutcome::Failed(err) => Some(err.to_string()),
            PairOutcome::Paths { .. } => None,
        };
        Self {
            source_id: result.source_id,
            receiver_id: result.receiver_id,
            paths: result.paths().to_vec(),
            error,
        }
    }
}

/// Receives pair results on the calling thread, in any inter-pair order.
pub trait PathSink {
    fn accept(&mut self, result: PairResult);
}

impl<F> PathSink for F
where
    F: FnMut(PairResult),
{
    fn accept(&mut self, result: PairResult) {
        self(result)
    }
}

/// Keeps every result in memory.
#[derive(Debug, Default)]
pub struct VecSink {
    pub results: Vec<PairResult>,
}

impl VecSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results sorted by (source id, receiver id).
    pub fn into_sorted(mut self) -> Vec<PairResult> {
        self.results
            .sort_by_key(|r| (r.source_id, r.receiver_id));
        self.results
    }
}

impl PathSink for VecSink {
    fn accept(&mut self, result: PairResult) {
        self.results.push(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(source_id: u64) -> PairResult {
        PairResult {
            source_id,
            receiver_id: 1,
            outcome: PairOutcome::Failed(PathError::Cancelled),
        }
    }

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |r: PairResult| seen.push(r.source_id);
            sink.accept(failed(3));
            sink.accept(failed(1));
        }
        assert_eq!(seen, vec![3, 1]);
    }

    #[test]
    fn test_vec_sink_sorted() -> anyhow::Result<()> {
        let mut sink = VecSink::new();
        sink.accept(failed(2));
        sink.accept(failed(0));
        let sorted = sink.into_sorted();
        assert_eq!(sorted[0].source_id, 0);
        assert!(sorted[1].is_failed());
        let record = PairRecord::from(&sorted[1]);
        let json = serde_json::to_string(&record)?;
        assert!(json.contains("cancelled") || json.contains("Cancelled"));
        Ok(())
    }
}
