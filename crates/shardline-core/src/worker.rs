// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Vertex and edge workers.
//!
//! A worker turns raw records of one entity kind into canonical records and
//! appends each one to the sink of its slice:
//!
//! 1. read the entity-type code from column 0;
//! 2. look up the column of the kind's slice role (`id` or `source`) and
//!    require exactly one value there;
//! 3. compute the slice from that value and its declared dtype;
//! 4. transform the whole record;
//! 5. append it to `sinks[slice]`.
//!
//! A failure in steps 1 to 4 drops the record and the worker moves on. Only a
//! sink failure stops it.

use std::collections::BTreeMap;

use shardline_schema::{EntityKind, EntityType, Schema};
use thiserror::Error;

use crate::alloc::IdAllocator;
use crate::partition::{compute_slice, SliceError};
use crate::record::RawRecord;
use crate::sink::{RecordSink, SinkError};
use crate::transform::{entity_type_of, TransformError, TransformedRecord, Transformer};

/// Why a single record was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record does not fit its schema.
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// The slice could not be computed.
    #[error(transparent)]
    Slice(#[from] SliceError),
    /// The entity type declares no field with the kind's slice role.
    #[error("{kind} type {entity_type} has no slice key field")]
    MissingSliceField {
        /// Vertex or edge.
        kind: EntityKind,
        /// Entity-type code.
        entity_type: EntityType,
    },
}

impl RecordError {
    /// Short, stable reason label used for drop statistics.
    pub fn reason(&self) -> &'static str {
        match self {
            RecordError::Transform(e) => match e {
                TransformError::EntityTypeCardinality { .. } | TransformError::BadEntityType(_) => {
                    "entity_type"
                }
                TransformError::UnknownEntityType { .. } => "unknown_type",
                TransformError::MissingField { .. } | TransformError::ExtraFields { .. } => {
                    "shape"
                }
                TransformError::Cardinality { .. } => "cardinality",
                TransformError::Coercion { .. } => "coercion",
                TransformError::IdSpaceExhausted => "id_space",
            },
            RecordError::Slice(_) => "slice_key",
            RecordError::MissingSliceField { .. } => "missing_slice_field",
        }
    }
}

/// Result of feeding one record to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Appended to the sink of `slice`.
    Written {
        /// Destination slice.
        slice: u32,
    },
    /// Skipped; nothing was written.
    Dropped(RecordError),
}

impl RecordOutcome {
    /// `true` for [`RecordOutcome::Written`].
    pub fn is_written(&self) -> bool {
        matches!(self, RecordOutcome::Written { .. })
    }
}

/// Per-worker counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Records fed.
    pub read: u64,
    /// Records written.
    pub written: u64,
    /// Records dropped.
    pub dropped: u64,
    /// Records written per slice.
    pub per_slice: Vec<u64>,
    /// Drops per [`RecordError::reason`].
    pub dropped_by_reason: BTreeMap<&'static str, u64>,
}

impl WorkerStats {
    fn with_slices(partition_count: usize) -> Self {
        Self {
            per_slice: vec![0; partition_count],
            ..Self::default()
        }
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &WorkerStats) {
        self.read += other.read;
        self.written += other.written;
        self.dropped += other.dropped;
        if self.per_slice.len() < other.per_slice.len() {
            self.per_slice.resize(other.per_slice.len(), 0);
        }
        for (acc, n) in self.per_slice.iter_mut().zip(&other.per_slice) {
            *acc += n;
        }
        for (reason, n) in &other.dropped_by_reason {
            *self.dropped_by_reason.entry(*reason).or_default() += n;
        }
    }
}

/// Shared routing machinery of both worker kinds.
struct SliceRouter<'s, S> {
    kind: EntityKind,
    schema: &'s Schema,
    transformer: Transformer<'s>,
    partition_count: u32,
    sinks: Vec<S>,
    stats: WorkerStats,
}

impl<'s, S: RecordSink> SliceRouter<'s, S> {
    fn new(kind: EntityKind, schema: &'s Schema, allocator: &'s IdAllocator, sinks: Vec<S>) -> Self {
        // more sinks than u32::MAX cannot be addressed anyway
        let partition_count = u32::try_from(sinks.len()).unwrap_or(u32::MAX);
        Self {
            kind,
            schema,
            transformer: Transformer::new(schema, allocator),
            partition_count,
            stats: WorkerStats::with_slices(sinks.len()),
            sinks,
        }
    }

    fn route(&self, raw: &RawRecord<'_>) -> Result<(u32, TransformedRecord), RecordError> {
        let kind = self.kind;
        let entity_type = entity_type_of(raw)?;
        let entity = self
            .schema
            .entity(kind, entity_type)
            .ok_or(TransformError::UnknownEntityType { kind, entity_type })?;
        let key = entity
            .field(kind.slice_role())
            .ok_or(RecordError::MissingSliceField { kind, entity_type })?;
        let identifier = raw
            .single(key.column)
            .map_err(|found| TransformError::Cardinality {
                column: key.column,
                name: key.name.clone(),
                found,
            })?;
        let slice = compute_slice(identifier.as_bytes(), key.dtype, self.partition_count)?;
        let record = self.transformer.transform(kind, raw)?;
        Ok((slice, record))
    }

    fn parse_record(&mut self, raw: &RawRecord<'_>) -> Result<RecordOutcome, SinkError> {
        self.stats.read += 1;
        match self.route(raw) {
            Ok((slice, record)) => {
                let index = slice as usize;
                let sink = self.sinks.get_mut(index).ok_or(SinkError::NoSink(slice))?;
                sink.write_record(&record)?;
                self.stats.written += 1;
                if let Some(n) = self.stats.per_slice.get_mut(index) {
                    *n += 1;
                }
                Ok(RecordOutcome::Written { slice })
            }
            Err(err) => {
                tracing::warn!(kind = %self.kind, reason = err.reason(), error = %err, "record dropped");
                self.stats.dropped += 1;
                *self.stats.dropped_by_reason.entry(err.reason()).or_default() += 1;
                Ok(RecordOutcome::Dropped(err))
            }
        }
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.sinks.iter_mut().try_for_each(|sink| sink.flush())
    }
}

/// Worker for vertex records; slices by the `id` field.
pub struct VertexWorker<'s, S> {
    router: SliceRouter<'s, S>,
}

impl<'s, S: RecordSink> VertexWorker<'s, S> {
    /// Worker writing slice `i` to `sinks[i]`.
    pub fn new(schema: &'s Schema, allocator: &'s IdAllocator, sinks: Vec<S>) -> Self {
        Self {
            router: SliceRouter::new(EntityKind::Vertex, schema, allocator, sinks),
        }
    }
}

/// Worker for edge records; slices by the `source` field so an edge lands
/// with its source vertex.
pub struct EdgeWorker<'s, S> {
    router: SliceRouter<'s, S>,
}

impl<'s, S: RecordSink> EdgeWorker<'s, S> {
    /// Worker writing slice `i` to `sinks[i]`.
    pub fn new(schema: &'s Schema, allocator: &'s IdAllocator, sinks: Vec<S>) -> Self {
        Self {
            router: SliceRouter::new(EntityKind::Edge, schema, allocator, sinks),
        }
    }
}

/// A worker of either kind.
///
/// Owns one sink per slice; the number of sinks is the partition count.
pub enum Worker<'s, S> {
    /// Vertex worker.
    Vertex(VertexWorker<'s, S>),
    /// Edge worker.
    Edge(EdgeWorker<'s, S>),
}

impl<'s, S: RecordSink> Worker<'s, S> {
    /// Build the worker for `kind`.
    pub fn for_kind(
        kind: EntityKind,
        schema: &'s Schema,
        allocator: &'s IdAllocator,
        sinks: Vec<S>,
    ) -> Self {
        match kind {
            EntityKind::Vertex => Worker::Vertex(VertexWorker::new(schema, allocator, sinks)),
            EntityKind::Edge => Worker::Edge(EdgeWorker::new(schema, allocator, sinks)),
        }
    }

    fn router(&self) -> &SliceRouter<'s, S> {
        match self {
            Worker::Vertex(w) => &w.router,
            Worker::Edge(w) => &w.router,
        }
    }

    fn router_mut(&mut self) -> &mut SliceRouter<'s, S> {
        match self {
            Worker::Vertex(w) => &mut w.router,
            Worker::Edge(w) => &mut w.router,
        }
    }

    /// Kind of records this worker accepts.
    pub fn kind(&self) -> EntityKind {
        self.router().kind
    }

    /// Number of slices.
    pub fn partition_count(&self) -> u32 {
        self.router().partition_count
    }

    /// Feed one record.
    ///
    /// A malformed record yields `Ok(RecordOutcome::Dropped(_))`; `Err` is
    /// reserved for sink failures, which must abort the job.
    pub fn parse_record(&mut self, raw: &RawRecord<'_>) -> Result<RecordOutcome, SinkError> {
        self.router_mut().parse_record(raw)
    }

    /// Flush every sink.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.router_mut().flush()
    }

    /// Counters so far.
    pub fn stats(&self) -> &WorkerStats {
        &self.router().stats
    }

    /// Flush and return the counters.
    pub fn finish(mut self) -> Result<WorkerStats, SinkError> {
        self.flush()?;
        let router = match self {
            Worker::Vertex(w) => w.router,
            Worker::Edge(w) => w.router,
        };
        Ok(router.stats)
    }
}
