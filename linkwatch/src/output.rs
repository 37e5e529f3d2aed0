//! Destinations for per-second metrics records.

use std::path::{Path, PathBuf};

use linkwatch_types::{LinkIdentity, MetricsRecord, METRICS_CSV_HEADER};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;

/// Local wall-clock stamp used in artifact file names.
pub(crate) fn file_timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// A metrics record tagged with the link it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMetrics {
    pub link: LinkIdentity,
    pub record: MetricsRecord,
}

/// Where a monitor sends its per-second records.
#[derive(Debug, Clone)]
pub enum MetricsSink {
    /// Write `<sanitized>_metrics_<timestamp>.csv` into this directory.
    ///
    /// One row per second, flushed as it is written.
    Csv(PathBuf),

    /// Send records through a channel.
    ///
    /// Use `MetricsSink::channel()` to create this variant and get the
    /// receiver.
    Channel(mpsc::Sender<LinkMetrics>),
}

impl MetricsSink {
    /// Create a CSV sink writing into `dir`.
    pub fn csv(dir: impl Into<PathBuf>) -> Self {
        MetricsSink::Csv(dir.into())
    }

    /// Create a channel sink and return both the sink and receiver.
    ///
    /// # Example
    ///
    /// ```rust
    /// use linkwatch::MetricsSink;
    ///
    /// let (sink, mut rx) = MetricsSink::channel(16);
    ///
    /// // Later, receive records
    /// // while let Some(metrics) = rx.recv().await {
    /// //     println!("link {}: {} packets", metrics.link, metrics.record.total_packets);
    /// // }
    /// ```
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<LinkMetrics>) {
        let (tx, rx) = mpsc::channel(buffer);
        (MetricsSink::Channel(tx), rx)
    }

    /// Prepare the sink for `link`. CSV sinks create their file and write
    /// the header.
    pub(crate) async fn open(
        &self,
        link: &LinkIdentity,
        timestamp: &str,
    ) -> std::io::Result<OpenSink> {
        match self {
            MetricsSink::Csv(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                let path = dir.join(format!("{}_metrics_{}.csv", link.sanitized, timestamp));
                let mut writer = BufWriter::new(File::create(&path).await?);
                writer.write_all(METRICS_CSV_HEADER.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok(OpenSink::Csv { path, writer })
            }
            MetricsSink::Channel(tx) => Ok(OpenSink::Channel(tx.clone())),
        }
    }
}

/// A sink bound to one link.
#[derive(Debug)]
pub(crate) enum OpenSink {
    Csv {
        path: PathBuf,
        writer: BufWriter<File>,
    },
    Channel(mpsc::Sender<LinkMetrics>),
}

impl OpenSink {
    pub(crate) async fn emit(
        &mut self,
        link: &LinkIdentity,
        record: &MetricsRecord,
    ) -> std::io::Result<()> {
        match self {
            OpenSink::Csv { writer, .. } => {
                let mut row = record.to_csv_row();
                row.push('\n');
                writer.write_all(row.as_bytes()).await?;
                writer.flush().await?;
            }
            OpenSink::Channel(tx) => {
                // Best effort send (don't block if channel is full)
                let _ = tx.try_send(LinkMetrics {
                    link: link.clone(),
                    record: *record,
                });
            }
        }
        Ok(())
    }

    pub(crate) async fn close(self) -> std::io::Result<()> {
        match self {
            OpenSink::Csv { mut writer, .. } => {
                writer.flush().await?;
                writer.into_inner().sync_all().await
            }
            OpenSink::Channel(_) => Ok(()),
        }
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        match self {
            OpenSink::Csv { path, .. } => Some(path),
            OpenSink::Channel(_) => None,
        }
    }
}
