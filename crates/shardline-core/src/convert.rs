// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Parallel conversion job.
//!
//! Input units are claimed by scoped worker threads through one atomic
//! counter, so a thread that finishes a small file immediately picks up the
//! next unclaimed unit. Each thread lazily builds one [`Worker`] per entity
//! kind, and each of those owns its own sinks. The [`IdAllocator`] is the only
//! state threads share.
//!
//! Which thread converts which unit is not deterministic; the slice of every
//! record is. Per-slice record counts therefore do not depend on
//! `worker_count`. With string identifiers the allocated ids do depend on
//! claim order.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shardline_config::{ConfigError, ConfigKey, ConfigService, ConfigStore};
use shardline_schema::{EntityKind, Schema};
use thiserror::Error;

use crate::alloc::IdAllocator;
use crate::record::RecordFormat;
use crate::sink::{RecordSink, SinkError, SinkFactory};
use crate::worker::{Worker, WorkerStats};

/// Slot holding the persisted [`ConvertOptions`].
pub const CONVERT_CONFIG_KEY: ConfigKey<ConvertOptions> = ConfigKey::new("convert");

/// Knobs of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertOptions {
    /// Number of slices (`N`).
    pub partition_count: u32,
    /// Maximum number of worker threads.
    ///
    /// A unit is never split across threads, so a run uses at most
    /// `min(worker_count, units)` threads. Split a large input into several
    /// files to convert it in parallel.
    pub worker_count: usize,
    /// Input line format.
    pub format: RecordFormat,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            partition_count: 16,
            worker_count: std::thread::available_parallelism().map_or(1, usize::from),
            format: RecordFormat::default(),
        }
    }
}

impl ConvertOptions {
    /// Options stored under [`CONVERT_CONFIG_KEY`], or the defaults.
    pub fn load<S: ConfigStore>(service: &ConfigService<S>) -> Result<Self, ConfigError> {
        service.get_or_default(&CONVERT_CONFIG_KEY)
    }
}

/// Where the lines of an input unit come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSource {
    /// A text file, read line by line.
    File(PathBuf),
    /// Lines already in memory.
    Lines(Vec<String>),
}

/// One independently claimable chunk of input of a single entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputUnit {
    /// Kind of every record in the unit.
    pub kind: EntityKind,
    /// Line source.
    pub source: UnitSource,
}

impl InputUnit {
    /// Unit backed by a file.
    pub fn file(kind: EntityKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            source: UnitSource::File(path.into()),
        }
    }

    /// Unit backed by in-memory lines.
    pub fn lines<I, L>(kind: EntityKind, lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            kind,
            source: UnitSource::Lines(lines.into_iter().map(Into::into).collect()),
        }
    }
}

/// Fatal conversion failure.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// `partition_count` is zero.
    #[error("partition count must be positive")]
    ZeroPartitions,
    /// `worker_count` is zero.
    #[error("worker count must be positive")]
    ZeroWorkers,
    /// Field and value separators are the same character.
    #[error("field and value separators are both {0:?}")]
    SeparatorClash(char),
    /// Input of a kind the schema declares no entity type for.
    #[error("input contains {0} records but the schema declares no {0} types")]
    Undeclared(EntityKind),
    /// An input file could not be read.
    #[error("cannot read {path}: {source}")]
    Input {
        /// Offending file.
        path: PathBuf,
        /// Underlying failure.
        source: io::Error,
    },
    /// A sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Summary of a finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertReport {
    /// Merged vertex worker counters.
    pub vertices: WorkerStats,
    /// Merged edge worker counters.
    pub edges: WorkerStats,
    /// Input units converted.
    pub units: usize,
    /// Worker threads used.
    pub threads: usize,
    /// Identifiers bound in the allocator when the job ended.
    pub allocated_ids: usize,
}

impl ConvertReport {
    /// Counters of one kind.
    pub fn stats(&self, kind: EntityKind) -> &WorkerStats {
        match kind {
            EntityKind::Vertex => &self.vertices,
            EntityKind::Edge => &self.edges,
        }
    }

    fn stats_mut(&mut self, kind: EntityKind) -> &mut WorkerStats {
        match kind {
            EntityKind::Vertex => &mut self.vertices,
            EntityKind::Edge => &mut self.edges,
        }
    }

    /// Records read across both kinds.
    pub fn read(&self) -> u64 {
        self.vertices.read + self.edges.read
    }

    /// Records written across both kinds.
    pub fn written(&self) -> u64 {
        self.vertices.written + self.edges.written
    }

    /// Records dropped across both kinds.
    pub fn dropped(&self) -> u64 {
        self.vertices.dropped + self.edges.dropped
    }
}

/// Runs conversion jobs for one schema.
#[derive(Debug, Clone)]
pub struct Converter {
    schema: Arc<Schema>,
    options: ConvertOptions,
}

const fn kind_slot(kind: EntityKind) -> usize {
    match kind {
        EntityKind::Vertex => 0,
        EntityKind::Edge => 1,
    }
}

impl Converter {
    /// Converter over a loaded schema.
    pub fn new(schema: Arc<Schema>, options: ConvertOptions) -> Self {
        Self { schema, options }
    }

    fn validate(&self, units: &[InputUnit]) -> Result<(), ConvertError> {
        if self.options.partition_count == 0 {
            return Err(ConvertError::ZeroPartitions);
        }
        if self.options.worker_count == 0 {
            return Err(ConvertError::ZeroWorkers);
        }
        if !self.options.format.is_valid() {
            return Err(ConvertError::SeparatorClash(
                self.options.format.field_separator,
            ));
        }
        for kind in EntityKind::ALL {
            if units.iter().any(|u| u.kind == kind) && !self.schema.declares(kind) {
                return Err(ConvertError::Undeclared(kind));
            }
        }
        Ok(())
    }

    /// Convert every unit, routing records into sinks opened by `factory`.
    ///
    /// Malformed records are dropped and counted. Unreadable input and sink
    /// failures abort the job; the remaining threads stop claiming units.
    /// A panic in a worker thread is propagated to the caller.
    pub fn convert<F: SinkFactory>(
        &self,
        units: &[InputUnit],
        factory: &F,
        allocator: &IdAllocator,
    ) -> Result<ConvertReport, ConvertError> {
        self.validate(units)?;
        let threads = self.options.worker_count.min(units.len());
        tracing::info!(
            units = units.len(),
            threads,
            partitions = self.options.partition_count,
            "conversion started"
        );

        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let results: Vec<Result<Vec<(EntityKind, WorkerStats)>, ConvertError>> =
            std::thread::scope(|s| {
                let handles: Vec<_> = (0..threads)
                    .map(|worker| {
                        let next = &next;
                        let failed = &failed;
                        s.spawn(move || {
                            let result =
                                self.run_thread(worker, units, next, failed, factory, allocator);
                            if result.is_err() {
                                failed.store(true, Ordering::Relaxed);
                            }
                            result
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| match h.join() {
                        Ok(r) => r,
                        Err(e) => std::panic::resume_unwind(e),
                    })
                    .collect()
            });

        let mut report = ConvertReport {
            units: units.len(),
            threads,
            ..ConvertReport::default()
        };
        for result in results {
            for (kind, stats) in result? {
                report.stats_mut(kind).merge(&stats);
            }
        }
        report.allocated_ids = allocator.len();
        tracing::info!(
            read = report.read(),
            written = report.written(),
            dropped = report.dropped(),
            allocated_ids = report.allocated_ids,
            "conversion finished"
        );
        Ok(report)
    }

    fn run_thread<F: SinkFactory>(
        &self,
        worker: usize,
        units: &[InputUnit],
        next: &AtomicUsize,
        failed: &AtomicBool,
        factory: &F,
        allocator: &IdAllocator,
    ) -> Result<Vec<(EntityKind, WorkerStats)>, ConvertError> {
        let mut workers: [Option<Worker<'_, F::Sink>>; 2] = [None, None];
        loop {
            if failed.load(Ordering::Relaxed) {
                break;
            }
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(unit) = units.get(index) else {
                break;
            };
            let slot = kind_slot(unit.kind);
            if workers[slot].is_none() {
                workers[slot] = Some(self.open_worker(unit.kind, worker, factory, allocator)?);
            }
            let Some(w) = workers[slot].as_mut() else {
                continue;
            };
            let span = tracing::warn_span!(
                "unit",
                index,
                kind = %unit.kind,
                line = tracing::field::Empty
            );
            let _entered = span.enter();
            self.feed(w, &unit.source, &span)?;
            tracing::debug!(worker, "unit converted");
        }

        workers
            .into_iter()
            .flatten()
            .map(|w| {
                let kind = w.kind();
                w.finish().map(|stats| (kind, stats)).map_err(ConvertError::from)
            })
            .collect()
    }

    fn open_worker<'a, F: SinkFactory>(
        &'a self,
        kind: EntityKind,
        worker: usize,
        factory: &F,
        allocator: &'a IdAllocator,
    ) -> Result<Worker<'a, F::Sink>, SinkError> {
        let sinks = (0..self.options.partition_count)
            .map(|slice| factory.open(kind, slice, worker))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Worker::for_kind(kind, &self.schema, allocator, sinks))
    }

    fn feed<S: RecordSink>(
        &self,
        worker: &mut Worker<'_, S>,
        source: &UnitSource,
        span: &tracing::Span,
    ) -> Result<(), ConvertError> {
        match source {
            UnitSource::Lines(lines) => {
                for (n, line) in lines.iter().enumerate() {
                    self.feed_line(worker, n + 1, line, span)?;
                }
            }
            UnitSource::File(path) => {
                let input_error = |source| ConvertError::Input {
                    path: path.clone(),
                    source,
                };
                let reader = BufReader::new(File::open(path).map_err(input_error)?);
                for (n, line) in reader.lines().enumerate() {
                    let line = line.map_err(input_error)?;
                    self.feed_line(worker, n + 1, &line, span)?;
                }
            }
        }
        Ok(())
    }

    fn feed_line<S: RecordSink>(
        &self,
        worker: &mut Worker<'_, S>,
        line_no: usize,
        line: &str,
        span: &tracing::Span,
    ) -> Result<(), ConvertError> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            return Ok(());
        }
        span.record("line", line_no);
        let raw = self.options.format.parse(line);
        worker.parse_record(&raw)?;
        Ok(())
    }
}
