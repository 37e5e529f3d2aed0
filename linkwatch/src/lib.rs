//! # linkwatch
//!
//! Measures the quality of MAVLink telemetry links: packet loss, reordering,
//! round-trip latency and outages, for one or more links at once.
//!
//! Each link gets a [`LinkMonitor`] that talks to the vehicle over UDP, TCP
//! or a serial radio, probes it with TIMESYNC once a second and writes one
//! metrics row per second plus a latency histogram when it stops. An
//! [`Orchestrator`] runs several monitors side by side.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linkwatch::{MetricsSink, MonitorConfig, Orchestrator};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), linkwatch::LinkError> {
//!     let (sink, mut records) = MetricsSink::channel(64);
//!     let config = MonitorConfig::new(1, 1)
//!         .with_output_dir("output")
//!         .with_uniform_rate(4)
//!         .with_sink(sink);
//!
//!     tokio::spawn(async move {
//!         while let Some(m) = records.recv().await {
//!             println!("[{}] {} packets", m.link.id, m.record.total_packets);
//!         }
//!     });
//!
//!     let summary = Orchestrator::new(["udpin:0.0.0.0:14550"], config, CancellationToken::new())
//!         .with_duration(Some(Duration::from_secs(60)))
//!         .execute()
//!         .await?;
//!     println!("{} link(s) tested", summary.links_tested());
//!     Ok(())
//! }
//! ```
//!
//! ## Connection descriptors
//!
//! - `udpout:<host>:<port>` (or `udp:`) sends to a vehicle
//! - `udpin:<bind>:<port>` listens and replies to the latest sender
//! - `tcp:<host>:<port>` / `tcpin:<bind>:<port>`
//! - `<device>:<baud>` for serial radios

pub mod config;
pub mod duration;
mod error;
mod histogram;
pub mod monitor;
mod orchestrator;
mod output;
pub mod transport;

pub use error::LinkError;
pub use histogram::HistogramAggregator;
pub use monitor::{LinkMonitor, MonitorConfig};
pub use orchestrator::Orchestrator;
pub use output::{LinkMetrics, MetricsSink};
pub use transport::{TransportChannel, TransportEvent, TransportOptions};

// Re-export types for convenience
pub use linkwatch_codec::{MavlinkCodec, ProtocolCodec, SigningKey};
pub use linkwatch_types::{
    LatencyStats, LinkDescriptor, LinkFailure, LinkIdentity, LinkReport, LinkTotals,
    MetricsRecord, RunSummary, StreamCategory,
};
