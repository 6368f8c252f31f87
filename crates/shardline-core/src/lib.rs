// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! shardline-core: conversion of raw graph records into slice-partitioned
//! record streams.
//!
//! Data flow for one record:
//!
//! ```text
//! raw line ─► RawRecord ─► Schema lookup ─► compute_slice(primary id)
//!                                       └─► Transformer ─► sink[slice]
//! ```
//!
//! Everything on that path is pure except the [`IdAllocator`], which is the
//! single piece of state shared by all workers of a run.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

/// Shared raw-identifier → numeric-id allocator.
pub mod alloc;
/// Parallel conversion job.
pub mod convert;
/// Frozen slice routing.
pub mod partition;
/// Borrowed views over raw input lines.
pub mod record;
/// Per-slice output sinks and partition file framing.
pub mod sink;
/// Raw record → canonical record transformation.
pub mod transform;
mod value;
/// Vertex and edge workers.
pub mod worker;

pub use alloc::{AllocError, IdAllocator, IdEntry, IdMapping};
pub use convert::{
    ConvertError, ConvertOptions, ConvertReport, Converter, InputUnit, UnitSource,
    CONVERT_CONFIG_KEY,
};
pub use partition::{compute_slice, slice_key_digest, SliceError};
pub use record::{RawRecord, RecordFormat};
pub use sink::{
    partition_file_name, read_slice, MemorySink, MemorySinkFactory, PartitionDirFactory,
    PartitionFileSink, PartitionReader, RecordSink, SinkError, SinkFactory,
};
pub use transform::{EdgeRecord, TransformError, TransformedRecord, Transformer, VertexRecord};
pub use value::{AttrValue, CoercionError, EntityId, Scalar};
pub use worker::{EdgeWorker, RecordError, RecordOutcome, VertexWorker, Worker, WorkerStats};

pub use shardline_schema::{Dtype, EntityKind, EntityType, FieldRole, Schema};
