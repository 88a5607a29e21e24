//! Fan-out of the path search over many source/receiver pairs.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::compute::cancel::CancellationToken;
use crate::compute::progress::{
    FnProgress, NoProgress, Progress, ProgressCounter, ProgressReporter,
};
use crate::compute::sink::{PairOutcome, PairResult, PathSink, ReceiverId, SourceId};
use crate::config::ComputeConfig;
use crate::error::{PathError, Result};
use crate::geom::point::Point;
use crate::paths::finder::PathFinder;
use crate::paths::mirror::MirrorCache;
use crate::paths::path::PathKind;
use crate::scene::Scene;

/// Work unit cell size used when the search radius is zero.
const DEFAULT_CELL_SIZE: f64 = 100.;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourcePoint {
    pub id: SourceId,
    pub position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReceiverPoint {
    pub id: ReceiverId,
    pub position: Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairRequest {
    pub source_id: SourceId,
    pub source: Point,
    pub receiver_id: ReceiverId,
    pub receiver: Point,
}

impl PairRequest {
    pub fn new(source: SourcePoint, receiver: ReceiverPoint) -> Self {
        Self {
            source_id: source.id,
            source: source.position,
            receiver_id: receiver.id,
            receiver: receiver.position,
        }
    }
}

/// Every (source, receiver) combination closer than `max_distance` (horizontal).
pub fn pairs_within(
    sources: &[SourcePoint],
    receivers: &[ReceiverPoint],
    max_distance: f64,
) -> Vec<PairRequest> {
    receivers
        .iter()
        .flat_map(|r| {
            sources
                .iter()
                .filter(move |s| s.position.distance_2d(&r.position) <= max_distance)
                .map(move |s| PairRequest::new(*s, *r))
        })
        .collect()
}

/// Counters of a finished (or cancelled) run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    /// Results delivered to the sink, failures included.
    pub processed: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub paths_per_kind: BTreeMap<String, usize>,
    /// Receivers with computed mirror receivers.
    pub mirror_cache_size: usize,
    pub mirror_receivers: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, result: &PairResult) {
        self.processed += 1;
        match &result.outcome {
            PairOutcome::Failed(_) => self.failed += 1,
            PairOutcome::Paths { paths, .. } => {
                for p in paths {
                    *self.paths_per_kind.entry(kind_name(p.kind)).or_default() += 1;
                }
            }
        }
    }

    pub fn paths_of_kind(&self, kind: PathKind) -> usize {
        self.paths_per_kind
            .get(&kind_name(kind))
            .copied()
            .unwrap_or(0)
    }
}

fn kind_name(kind: PathKind) -> String {
    format!("{kind:?}")
}

/// Batch path computation over a frozen scene.
///
/// Every run owns its worker pool, its mirror receiver cache and its
/// channels. Nothing outlives [`run`](Self::run).
pub struct ComputeRays<'a> {
    scene: &'a Scene,
    config: ComputeConfig,
    cancel: CancellationToken,
    counter: ProgressCounter,
}

impl<'a> ComputeRays<'a> {
    pub fn new(scene: &'a Scene, config: ComputeConfig) -> Self {
        Self {
            scene,
            config,
            cancel: CancellationToken::new(),
            counter: ProgressCounter::new(),
        }
    }

    /// Uses an existing token so the caller can stop the run from another thread.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of pairs computed so far by the workers.
    pub fn progress_counter(&self) -> ProgressCounter {
        self.counter.clone()
    }

    pub fn config(&self) -> &ComputeConfig {
        &self.config
    }

    pub fn run<S: PathSink>(&self, pairs: Vec<PairRequest>, sink: &mut S) -> Result<RunSummary> {
        self.run_with_reporter(pairs, sink, NoProgress)
    }

    /// Runs while reporting progress on the calling thread.
    ///
    /// - `progress_every` (from the config) equal to 0 disables reporting.
    /// - The reporter is called once at start (`processed=0`), then every
    ///   `progress_every` results, plus once at the end.
    pub fn run_with_progress<S, F>(
        &self,
        pairs: Vec<PairRequest>,
        sink: &mut S,
        report: F,
    ) -> Result<RunSummary>
    where
        S: PathSink,
        F: FnMut(&Progress),
    {
        let reporter = FnProgress {
            every: self.config.progress_every,
            f: report,
        };
        self.run_with_reporter(pairs, sink, reporter)
    }

    fn run_with_reporter<S: PathSink, R: ProgressReporter>(
        &self,
        pairs: Vec<PairRequest>,
        sink: &mut S,
        mut reporter: R,
    ) -> Result<RunSummary> {
        self.config.validate()?;
        let started = Instant::now();
        let total = pairs.len();
        let workers = self.config.workers;
        self.counter.reset();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("soundpath-worker-{i}"))
            .build()
            .map_err(|e| PathError::Config(format!("cannot start worker pool: {e}")))?;

        let cell_size = if self.scene.config().search_radius > 0. {
            self.scene.config().search_radius
        } else {
            DEFAULT_CELL_SIZE
        };
        let units = work_units(pairs, cell_size, self.config.unit_size);
        info!(
            "Computing {} pairs in {} work units on {} workers",
            total,
            units.len(),
            workers
        );

        let (unit_tx, unit_rx) = unbounded::<Vec<PairRequest>>();
        for unit in units {
            // The receiving end is alive until the end of this function
            let _ = unit_tx.send(unit);
        }
        drop(unit_tx);
        let (result_tx, result_rx) = bounded::<PairResult>(self.config.channel_capacity);

        let cache = MirrorCache::new();
        let mut summary = RunSummary {
            total,
            ..RunSummary::default()
        };
        let every = reporter.every();
        if every > 0 {
            reporter.report(&Progress::new(0, total, started));
        }

        std::thread::scope(|s| {
            let cache = &cache;
            s.spawn(move || {
                pool.scope(|ps| {
                    for _ in 0..workers {
                        let units = unit_rx.clone();
                        let results = result_tx.clone();
                        ps.spawn(move |_| self.work(cache, units, results));
                    }
                });
                // Workers are done, closing the channel ends the sink loop
                drop(result_tx);
            });

            // Dropped while unwinding from a panicking sink, which fails the
            // blocked sends and lets the workers return
            let result_rx = result_rx;
            for result in result_rx.iter() {
                summary.record(&result);
                sink.accept(result);
                if every > 0 && summary.processed % every == 0 {
                    reporter.report(&Progress::new(summary.processed, total, started));
                }
            }
        });

        if every > 0 && summary.processed % every != 0 {
            reporter.report(&Progress::new(summary.processed, total, started));
        }
        summary.cancelled = self.cancel.is_cancelled();
        summary.mirror_cache_size = cache.len();
        summary.mirror_receivers = cache.mirror_count();
        summary.elapsed = started.elapsed();
        if summary.cancelled {
            info!(
                "Cancelled after {} of {} pairs",
                summary.processed, summary.total
            );
        }
        info!(
            "Done: {} pairs, {} failed, {} mirror receivers for {} receivers, {:.2?}",
            summary.processed,
            summary.failed,
            summary.mirror_receivers,
            summary.mirror_cache_size,
            summary.elapsed
        );
        Ok(summary)
    }

    /// Worker loop: pulls units until the queue is empty or the run is cancelled.
    fn work(&self, cache: &MirrorCache, units: Receiver<Vec<PairRequest>>, results: Sender<PairResult>) {
        let finder = PathFinder::new(self.scene)
            .with_cache(cache)
            .with_cancellation(&self.cancel, self.config.cancel_check_interval);
        while let Ok(unit) = units.recv() {
            for pair in unit {
                if self.cancel.is_cancelled() {
                    debug!("Worker stopping on cancellation");
                    return;
                }
                let Some(result) = compute_pair(&finder, &pair) else {
                    continue;
                };
                self.counter.increment();
                // Blocks while the sink is behind
                if results.send(result).is_err() {
                    return;
                }
            }
        }
    }
}

/// Paths of one pair. None when the pair was interrupted by cancellation.
fn compute_pair(finder: &PathFinder, pair: &PairRequest) -> Option<PairResult> {
    let computed = catch_unwind(AssertUnwindSafe(|| {
        finder.find_paths_for(pair.source_id, pair.source, pair.receiver_id, pair.receiver)
    }));
    let outcome = match computed {
        Ok(Ok(found)) => PairOutcome::Paths {
            paths: found.paths,
            warnings: found.warnings,
        },
        Ok(Err(PathError::Cancelled)) => return None,
        Ok(Err(err)) => {
            warn!(
                "Pair (source {}, receiver {}) failed: {}",
                pair.source_id, pair.receiver_id, err
            );
            PairOutcome::Failed(err)
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            warn!(
                "Pair (source {}, receiver {}) panicked: {}",
                pair.source_id, pair.receiver_id, reason
            );
            PairOutcome::Failed(PathError::PairComputation {
                source_id: pair.source_id,
                receiver_id: pair.receiver_id,
                reason,
            })
        }
    };
    Some(PairResult {
        source_id: pair.source_id,
        receiver_id: pair.receiver_id,
        outcome,
    })
}

/// Groups pairs by the grid cell of their receiver, then cuts each cell into
/// units of at most `unit_size` pairs.
fn work_units(pairs: Vec<PairRequest>, cell_size: f64, unit_size: usize) -> Vec<Vec<PairRequest>> {
    let mut cells: BTreeMap<(i64, i64), Vec<PairRequest>> = BTreeMap::new();
    for pair in pairs {
        let key = (
            (pair.receiver.x / cell_size).floor() as i64,
            (pair.receiver.y / cell_size).floor() as i64,
        );
        cells.entry(key).or_default().push(pair);
    }
    let mut units = Vec::new();
    for (_, mut cell) in cells {
        cell.sort_by_key(|p| (p.receiver_id, p.source_id));
        units.extend(cell.chunks(unit_size.max(1)).map(|c| c.to_vec()));
    }
    units
}
