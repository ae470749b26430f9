//! Export sinks for finalized traffic records.
//!
//! The capture layer hands each record to exactly one [`TrafficSink`], once,
//! on the request's own task. Sinks must therefore return quickly: they
//! never touch the disk or the network themselves. Anything slow sits
//! behind a bounded queue and a background task.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::capture::record::TrafficRecord;
use crate::config::{ExportConfig, SinkKind};
use crate::observability::metrics;

/// Error type for export operations.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Export sink unavailable: {0}")]
    Unavailable(String),

    #[error("Export queue full")]
    Full,
}

/// Destination for finalized records.
pub trait TrafficSink: Send + Sync + 'static {
    /// Short name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Hand off one record. Must not block on slow I/O.
    fn export(&self, record: &TrafficRecord) -> Result<(), ExportError>;
}

/// A configured sink plus the background writer behind it, if any.
pub struct BuiltSink {
    pub sink: Arc<dyn TrafficSink>,
    /// Resolves once every queued record is written. Only finishes after
    /// all clones of `sink` are dropped.
    pub writer: Option<JoinHandle<()>>,
}

/// Build the sink selected by configuration.
///
/// Queued sinks spawn their writer task, so this must run inside a Tokio
/// runtime.
pub fn build_sink(config: &ExportConfig) -> Result<BuiltSink, ExportError> {
    let built = match config.sink {
        SinkKind::Log => BuiltSink {
            sink: Arc::new(LogSink),
            writer: None,
        },
        SinkKind::Discard => BuiltSink {
            sink: Arc::new(DiscardSink),
            writer: None,
        },
        SinkKind::JsonLines => {
            let path = config.path.as_deref().ok_or_else(|| {
                ExportError::Unavailable("json_lines sink has no path".to_string())
            })?;
            let (sink, writer) = JsonLinesSink::open(path, config.queue_capacity)?;
            BuiltSink {
                sink: Arc::new(sink),
                writer: Some(writer),
            }
        }
    };
    Ok(built)
}

/// Emits each record as one structured log event.
///
/// Abnormal traffic is logged at WARN, everything else at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl TrafficSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    fn export(&self, record: &TrafficRecord) -> Result<(), ExportError> {
        let line = serde_json::to_string(record)?;
        if record.abnormal {
            tracing::warn!(
                record_id = %record.id,
                source = %record.source_address,
                method = %record.method,
                path = %record.path,
                status = record.response_status,
                elapsed_ms = record.elapsed_millis,
                body_bytes = record.request_body_bytes,
                record = %line,
                "Abnormal traffic captured"
            );
        } else {
            tracing::info!(
                record_id = %record.id,
                source = %record.source_address,
                method = %record.method,
                path = %record.path,
                status = record.response_status,
                elapsed_ms = record.elapsed_millis,
                record = %line,
                "Traffic captured"
            );
        }
        Ok(())
    }
}

/// Most records written per flush.
const MAX_BATCH: usize = 500;

/// Appends records to a file, one JSON object per line.
///
/// `export` only queues the record. A background task drains the queue in
/// batches and writes each batch on the blocking pool, flushing once per
/// batch. When every clone of the sink is dropped the task writes what is
/// left and exits.
#[derive(Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
    queue: ChannelSink,
}

impl JsonLinesSink {
    /// Create or append to the file at `path` and start its writer task.
    ///
    /// Must be called inside a Tokio runtime. The returned handle resolves
    /// once the queue is closed and drained.
    pub fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), ExportError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (queue, receiver) = ChannelSink::new(capacity);

        let writer = tokio::spawn(write_batches(receiver, BufWriter::new(file)));

        tracing::info!(path = ?path, capacity, "JSON-lines traffic sink opened");
        Ok((Self { path, queue }, writer))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TrafficSink for JsonLinesSink {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    fn export(&self, record: &TrafficRecord) -> Result<(), ExportError> {
        self.queue.export(record)
    }
}

async fn write_batches(mut receiver: mpsc::Receiver<TrafficRecord>, mut file: BufWriter<File>) {
    while let Some(first) = receiver.recv().await {
        let mut batch = vec![first];
        while batch.len() < MAX_BATCH {
            match receiver.try_recv() {
                Ok(record) => batch.push(record),
                Err(_) => break,
            }
        }

        let written = tokio::task::spawn_blocking(move || {
            let result = write_batch(&mut file, &batch);
            (file, batch.len(), result)
        })
        .await;

        match written {
            Ok((returned, _, Ok(()))) => file = returned,
            Ok((returned, count, Err(e))) => {
                tracing::error!(error = %e, records = count, "Failed to write traffic batch");
                metrics::record_export_failure("json_lines");
                file = returned;
            }
            Err(e) => {
                tracing::error!(error = %e, "Traffic writer task aborted");
                return;
            }
        }
    }
}

fn write_batch(file: &mut BufWriter<File>, batch: &[TrafficRecord]) -> Result<(), ExportError> {
    for record in batch {
        serde_json::to_writer(&mut *file, record)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;
    Ok(())
}

/// Forwards records to a bounded queue without waiting.
///
/// A full queue is reported as [`ExportError::Full`]; the record is dropped
/// rather than slowing live traffic down.
#[derive(Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<TrafficRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TrafficRecord>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl TrafficSink for ChannelSink {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn export(&self, record: &TrafficRecord) -> Result<(), ExportError> {
        self.sender.try_send(record.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ExportError::Full,
            mpsc::error::TrySendError::Closed(_) => {
                ExportError::Unavailable("receiver dropped".to_string())
            }
        })
    }
}

/// Keeps records in process memory.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TrafficRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything exported so far.
    pub fn records(&self) -> Vec<TrafficRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrafficSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn export(&self, record: &TrafficRecord) -> Result<(), ExportError> {
        self.records
            .lock()
            .map_err(|e| ExportError::Unavailable(e.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

/// Accepts and drops every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl TrafficSink for DiscardSink {
    fn name(&self) -> &'static str {
        "discard"
    }

    fn export(&self, _record: &TrafficRecord) -> Result<(), ExportError> {
        Ok(())
    }
}
