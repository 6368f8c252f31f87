// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Output sinks.
//!
//! Every worker owns one sink per slice, so the write path never contends.
//! Partition files hold a sequence of frames:
//!
//! ```text
//! frame = LE_u32(len) || CBOR(TransformedRecord)   (len bytes)
//! ```
//!
//! One file exists per `(kind, slice, worker)`; a slice's stream is the
//! concatenation of its worker files in worker order. An output directory
//! holds the files of exactly one run: opening it for a new run removes the
//! partition files an earlier run left behind.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use shardline_schema::EntityKind;
use thiserror::Error;

use crate::transform::TransformedRecord;

/// Sink failure. Always fatal to the run.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Underlying I/O failure.
    #[error("sink io error: {0}")]
    Io(#[from] io::Error),
    /// Record could not be encoded.
    #[error("record encode error: {0}")]
    Encode(String),
    /// Frame could not be decoded.
    #[error("record decode error: {0}")]
    Decode(String),
    /// Encoded record does not fit a frame.
    #[error("encoded record of {0} bytes exceeds frame limit")]
    FrameTooLarge(usize),
    /// File ended in the middle of a frame.
    #[error("truncated frame")]
    Truncated,
    /// A record was routed to a slice the worker holds no sink for.
    #[error("no sink open for slice {0}")]
    NoSink(u32),
}

/// Destination of transformed records for one slice.
pub trait RecordSink {
    /// Append one record.
    fn write_record(&mut self, record: &TransformedRecord) -> Result<(), SinkError>;
    /// Push buffered records to their destination.
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// Opens the per-slice sinks of a worker.
pub trait SinkFactory: Sync {
    /// Sink type produced.
    type Sink: RecordSink;
    /// Open the sink for `(kind, slice)` owned by `worker`.
    fn open(&self, kind: EntityKind, slice: u32, worker: usize) -> Result<Self::Sink, SinkError>;
}

// ── in-memory ───────────────────────────────────────────────────────────

type Stream = Arc<Mutex<Vec<TransformedRecord>>>;

/// In-memory sink. Clones share the same stream.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Stream,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far.
    pub fn records(&self) -> Vec<TransformedRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records written so far.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// `true` when nothing was written.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, record: &TransformedRecord) -> Result<(), SinkError> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Factory of [`MemorySink`]s that keeps every stream for inspection.
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    streams: Arc<Mutex<BTreeMap<(EntityKind, u32, usize), MemorySink>>>,
}

impl MemorySinkFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records of one slice, worker streams concatenated in worker order.
    pub fn records(&self, kind: EntityKind, slice: u32) -> Vec<TransformedRecord> {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((k, s, _), _)| *k == kind && *s == slice)
            .flat_map(|(_, sink)| sink.records())
            .collect()
    }

    /// Total number of records written for `kind` across all slices.
    pub fn total(&self, kind: EntityKind) -> usize {
        self.streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, sink)| sink.len())
            .sum()
    }

    /// Number of sinks opened so far.
    pub fn opened(&self) -> usize {
        self.streams.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl SinkFactory for MemorySinkFactory {
    type Sink = MemorySink;

    fn open(&self, kind: EntityKind, slice: u32, worker: usize) -> Result<MemorySink, SinkError> {
        Ok(self
            .streams
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((kind, slice, worker))
            .or_default()
            .clone())
    }
}

// ── partition files ─────────────────────────────────────────────────────

/// File name of the stream written by `worker` for `(kind, slice)`.
pub fn partition_file_name(kind: EntityKind, slice: u32, worker: usize) -> String {
    format!("{kind}-{slice:05}-{worker:03}.part")
}

/// `(kind, slice)` of a name produced by [`partition_file_name`].
fn parse_partition_file_name(name: &str) -> Option<(EntityKind, u32)> {
    let stem = name.strip_suffix(".part")?;
    let mut parts = stem.splitn(3, '-');
    let kind = parts.next()?;
    let kind = EntityKind::ALL.into_iter().find(|k| k.name() == kind)?;
    let slice = parts.next()?;
    let worker = parts.next()?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if slice.len() < 5 || !digits(slice) || worker.len() < 3 || !digits(worker) {
        return None;
    }
    Some((kind, slice.parse().ok()?))
}

/// Partition files under `dir` accepted by `keep`, sorted by name.
fn partition_files(
    dir: &Path,
    keep: impl Fn(EntityKind, u32) -> bool,
) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some((kind, slice)) = name.to_str().and_then(parse_partition_file_name) else {
            continue;
        };
        if keep(kind, slice) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Buffered, framed partition file writer.
pub struct PartitionFileSink {
    path: PathBuf,
    out: BufWriter<File>,
    scratch: Vec<u8>,
}

impl PartitionFileSink {
    /// Create (or truncate) a partition file.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let out = BufWriter::new(File::create(&path)?);
        Ok(Self {
            path,
            out,
            scratch: Vec::new(),
        })
    }

    /// Path of the file being written.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for PartitionFileSink {
    fn write_record(&mut self, record: &TransformedRecord) -> Result<(), SinkError> {
        self.scratch.clear();
        ciborium::into_writer(record, &mut self.scratch)
            .map_err(|e| SinkError::Encode(e.to_string()))?;
        let len = u32::try_from(self.scratch.len())
            .map_err(|_| SinkError::FrameTooLarge(self.scratch.len()))?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&self.scratch)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Opens [`PartitionFileSink`]s under one output directory.
#[derive(Debug, Clone)]
pub struct PartitionDirFactory {
    dir: PathBuf,
}

impl PartitionDirFactory {
    /// Use `dir` as the output directory of a new run.
    ///
    /// Creates `dir` if needed and deletes every partition file already in
    /// it. Other files are left alone.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let stale = partition_files(&dir, |_, _| true)?;
        for path in &stale {
            fs::remove_file(path)?;
        }
        if !stale.is_empty() {
            tracing::info!(
                dir = %dir.display(),
                removed = stale.len(),
                "removed stale partition files"
            );
        }
        Ok(Self { dir })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SinkFactory for PartitionDirFactory {
    type Sink = PartitionFileSink;

    fn open(
        &self,
        kind: EntityKind,
        slice: u32,
        worker: usize,
    ) -> Result<PartitionFileSink, SinkError> {
        PartitionFileSink::create(self.dir.join(partition_file_name(kind, slice, worker)))
    }
}

/// Iterator over the frames of a partition stream.
pub struct PartitionReader<R> {
    input: R,
    scratch: Vec<u8>,
}

impl PartitionReader<BufReader<File>> {
    /// Open a partition file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Ok(Self::new(BufReader::new(File::open(path)?)))
    }
}

impl<R: Read> PartitionReader<R> {
    /// Read frames from any byte source.
    pub fn new(input: R) -> Self {
        Self {
            input,
            scratch: Vec::new(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<TransformedRecord>, SinkError> {
        let mut len_bytes = [0u8; 4];
        let mut filled = 0;
        while filled < len_bytes.len() {
            match self.input.read(&mut len_bytes[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(SinkError::Truncated),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        let len = u32::from_le_bytes(len_bytes) as usize;
        self.scratch.resize(len, 0);
        self.input.read_exact(&mut self.scratch).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                SinkError::Truncated
            } else {
                e.into()
            }
        })?;
        ciborium::from_reader(self.scratch.as_slice())
            .map(Some)
            .map_err(|e| SinkError::Decode(e.to_string()))
    }
}

impl<R: Read> Iterator for PartitionReader<R> {
    type Item = Result<TransformedRecord, SinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame().transpose()
    }
}

/// Every record of one slice under `dir`, worker files in worker order.
pub fn read_slice(
    dir: impl AsRef<Path>,
    kind: EntityKind,
    slice: u32,
) -> Result<Vec<TransformedRecord>, SinkError> {
    let files = partition_files(dir.as_ref(), |k, s| k == kind && s == slice)?;
    let mut out = Vec::new();
    for path in files {
        for record in PartitionReader::open(&path)? {
            out.push(record?);
        }
    }
    Ok(out)
}
