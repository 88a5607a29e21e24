//! Batch computation: workers, cancellation, progress and result sinks.
pub mod cancel;
pub mod progress;
pub mod runner;
pub mod sink;

pub use cancel::CancellationToken;
pub use progress::{Progress, ProgressCounter};
pub use runner::{ComputeRays, PairRequest, ReceiverPoint, RunSummary, SourcePoint, pairs_within};
pub use sink::{PairOutcome, PairRecord, PairResult, PathSink, ReceiverId, SourceId, VecSink};
