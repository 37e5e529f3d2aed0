//! Per-link monitoring engine.
//!
//! A [`LinkMonitor`] opens one transport, waits for the target to announce
//! itself, then runs a single task that interleaves inbound intake with
//! three 1 Hz duties: TIMESYNC probes, HEARTBEAT announcements and the
//! metrics tick. Because everything runs in that one task the trackers need
//! no locking.

mod latency;
mod outage;
mod sequence;

pub use latency::{LatencyTracker, MAX_OUTSTANDING};
pub use outage::{OutageEvent, OutageTracker};
pub use sequence::{SequenceCounts, SequenceOutcome, SequenceTracker, EVICTION_WINDOW};

use std::path::{Path, PathBuf};
use std::time::Duration;

use linkwatch_codec::{MavlinkCodec, ProtocolCodec, SigningConfig, SigningKey};
use linkwatch_types::{
    Heartbeat, LinkDescriptor, LinkIdentity, LinkReport, LinkTotals, Message, MessageKind,
    MetricsRecord, RequestDataStream, StreamCategory, Timesync,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::duration::format_duration;
use crate::error::LinkError;
use crate::histogram::HistogramAggregator;
use crate::output::{file_timestamp, MetricsSink, OpenSink};
use crate::transport::{TransportChannel, TransportEvent, TransportOptions};

/// Period of every recurring duty.
pub const TICK: Duration = Duration::from_secs(1);

/// Identity this tool uses on the wire.
pub const GROUND_SYSTEM_ID: u8 = 255;
pub const GROUND_COMPONENT_ID: u8 = 0;

/// Settings shared by every monitor in a run.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// System id of the vehicle under test.
    pub target_system: u8,
    /// Component id of the vehicle under test.
    pub target_component: u8,
    pub outage_timeout: Duration,
    /// Consecutive packets needed to end an outage.
    pub recovery_hysteresis: u32,
    pub eviction_window: Duration,
    pub handshake_timeout: Duration,
    pub transport: TransportOptions,
    /// Requested telemetry rates. Zero rates are not sent.
    pub stream_rates: Vec<(StreamCategory, u16)>,
    pub signing_key: Option<SigningKey>,
    /// Signing link id; defaults to the link's position when unset.
    pub signing_link_id: Option<u8>,
    /// Where the metrics CSV and histogram report go.
    pub output_dir: PathBuf,
    /// Write the per-second CSV into `output_dir`.
    pub write_csv: bool,
    /// Extra destinations for per-second records.
    pub sinks: Vec<MetricsSink>,
}

impl MonitorConfig {
    pub fn new(target_system: u8, target_component: u8) -> Self {
        Self {
            target_system,
            target_component,
            outage_timeout: Duration::from_secs(1),
            recovery_hysteresis: 3,
            eviction_window: EVICTION_WINDOW,
            handshake_timeout: Duration::from_secs(10),
            transport: TransportOptions::default(),
            stream_rates: Vec::new(),
            signing_key: None,
            signing_link_id: None,
            output_dir: PathBuf::from("output"),
            write_csv: true,
            sinks: Vec::new(),
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_outage(mut self, timeout: Duration, hysteresis: u32) -> Self {
        self.outage_timeout = timeout;
        self.recovery_hysteresis = hysteresis;
        self
    }

    pub fn with_eviction_window(mut self, window: Duration) -> Self {
        self.eviction_window = window;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.transport.open_timeout = timeout;
        self
    }

    /// Same rate for every category.
    pub fn with_uniform_rate(mut self, rate_hz: u16) -> Self {
        self.stream_rates = StreamCategory::ALL.iter().map(|c| (*c, rate_hz)).collect();
        self
    }

    pub fn with_stream_rate(mut self, category: StreamCategory, rate_hz: u16) -> Self {
        self.stream_rates.retain(|(c, _)| *c != category);
        self.stream_rates.push((category, rate_hz));
        self
    }

    pub fn with_signing(mut self, key: SigningKey, link_id: Option<u8>) -> Self {
        self.signing_key = Some(key);
        self.signing_link_id = link_id;
        self
    }

    pub fn with_sink(mut self, sink: MetricsSink) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Disable the CSV file, e.g. when only a channel sink is wanted.
    pub fn without_csv(mut self) -> Self {
        self.write_csv = false;
        self
    }
}

enum MonitorState {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<LinkEngine>,
        metrics_path: Option<PathBuf>,
    },
    Stopped,
}

/// Tests one link.
///
/// # Example
///
/// ```rust,no_run
/// use linkwatch::{LinkMonitor, MonitorConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), linkwatch::LinkError> {
/// let config = MonitorConfig::new(1, 1).with_output_dir("output");
/// let mut monitor = LinkMonitor::new(0, "udpin:0.0.0.0:14550", config);
///
/// monitor.start(&CancellationToken::new()).await?;
/// tokio::time::sleep(std::time::Duration::from_secs(30)).await;
/// let report = monitor.stop().await?;
/// println!("{} packets", report.totals.total_packets);
/// # Ok(())
/// # }
/// ```
pub struct LinkMonitor {
    identity: LinkIdentity,
    config: MonitorConfig,
    state: MonitorState,
}

impl std::fmt::Debug for LinkMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkMonitor")
            .field("identity", &self.identity)
            .field("running", &self.is_running())
            .finish()
    }
}

impl LinkMonitor {
    pub fn new(id: usize, descriptor: impl Into<String>, config: MonitorConfig) -> Self {
        Self {
            identity: LinkIdentity::new(id, descriptor),
            config,
            state: MonitorState::Idle,
        }
    }

    pub fn identity(&self) -> &LinkIdentity {
        &self.identity
    }

    /// Whether the monitor task is alive. Becomes false after a disconnect
    /// even before [`stop`](Self::stop) is called.
    pub fn is_running(&self) -> bool {
        match &self.state {
            MonitorState::Running { task, .. } => !task.is_finished(),
            _ => false,
        }
    }

    /// Path of the metrics CSV, once started.
    pub fn metrics_path(&self) -> Option<&Path> {
        match &self.state {
            MonitorState::Running { metrics_path, .. } => metrics_path.as_deref(),
            _ => None,
        }
    }

    /// Open the link, wait for the target's heartbeat and start monitoring.
    ///
    /// `shutdown` cancels the handshake and, later, the running task.
    pub async fn start(&mut self, shutdown: &CancellationToken) -> Result<(), LinkError> {
        if !matches!(self.state, MonitorState::Idle) {
            return Err(LinkError::AlreadyStarted);
        }
        let id = self.identity.id;
        info!("[{}] Starting monitor for {}", id, self.identity.descriptor);

        let descriptor: LinkDescriptor = self.identity.descriptor.parse()?;
        log_connect(id, &descriptor);

        let cancel = shutdown.child_token();
        let (transport, inbound) =
            TransportChannel::open(&descriptor, self.config.transport, &cancel).await?;

        let mut codec = MavlinkCodec::new(GROUND_SYSTEM_ID, GROUND_COMPONENT_ID);
        if let Some(key) = &self.config.signing_key {
            let link_id = self.config.signing_link_id.unwrap_or(id as u8);
            codec = codec.with_signing(SigningConfig {
                key: key.clone(),
                link_id,
            });
            info!("[{}] MAVLink signing enabled (link_id={})", id, link_id);
        }

        let mut engine = LinkEngine::new(
            self.identity.clone(),
            self.config.clone(),
            transport,
            inbound,
            Box::new(codec),
        );

        let result = async {
            engine.handshake(descriptor.is_listener(), &cancel).await?;
            engine.begin().await
        }
        .await;
        if let Err(err) = result {
            engine.inbound.close();
            if let Err(close_err) = engine.transport.close().await {
                debug!("[{}] Error closing transport: {}", id, close_err);
            }
            return Err(err);
        }

        let metrics_path = engine.metrics_path().map(Path::to_path_buf);
        let task = tokio::spawn(engine.run(cancel.clone()));
        self.state = MonitorState::Running {
            cancel,
            task,
            metrics_path,
        };
        Ok(())
    }

    /// Stop the link and produce its report.
    ///
    /// Fails with [`LinkError::NotRunning`] if the monitor never started or
    /// was already stopped. Problems while tearing down are recorded in
    /// [`LinkReport::errors`] instead.
    pub async fn stop(&mut self) -> Result<LinkReport, LinkError> {
        let (cancel, task) = match std::mem::replace(&mut self.state, MonitorState::Stopped) {
            MonitorState::Running { cancel, task, .. } => (cancel, task),
            MonitorState::Idle => {
                self.state = MonitorState::Idle;
                return Err(LinkError::NotRunning);
            }
            MonitorState::Stopped => return Err(LinkError::NotRunning),
        };

        info!("[{}] Stopping monitor...", self.identity.id);
        let stopped_at = Instant::now();
        cancel.cancel();
        let engine = task.await?;
        Ok(engine.finish(stopped_at).await)
    }
}

fn log_connect(id: usize, descriptor: &LinkDescriptor) {
    match descriptor {
        LinkDescriptor::UdpOut { host, port } => {
            info!("[{}] Connecting to UDP {}:{}", id, host, port)
        }
        LinkDescriptor::UdpIn { bind, port } => {
            info!("[{}] Listening for UDP on {}:{}", id, bind, port)
        }
        LinkDescriptor::TcpOut { host, port } => {
            info!("[{}] Connecting to TCP {}:{}", id, host, port)
        }
        LinkDescriptor::TcpIn { bind, port } => {
            info!("[{}] Creating TCP server on {}:{}", id, bind, port)
        }
        LinkDescriptor::Serial { path, baud } => {
            info!("[{}] Opening serial port {} at {} baud", id, path, baud)
        }
    }
}

/// Counters reset every tick.
#[derive(Debug, Default, Clone, Copy)]
struct TickCounters {
    packets: u64,
    bytes: u64,
}

/// State owned by the monitor task.
#[derive(Debug)]
struct LinkEngine {
    identity: LinkIdentity,
    config: MonitorConfig,
    transport: TransportChannel,
    inbound: mpsc::Receiver<TransportEvent>,
    codec: Box<dyn ProtocolCodec>,
    sequence: SequenceTracker,
    latency: LatencyTracker,
    outage: OutageTracker,
    histogram: HistogramAggregator,
    tick: TickCounters,
    totals: LinkTotals,
    heartbeat_seen: bool,
    started_at: Instant,
    sinks: Vec<OpenSink>,
}

impl LinkEngine {
    fn new(
        identity: LinkIdentity,
        config: MonitorConfig,
        transport: TransportChannel,
        inbound: mpsc::Receiver<TransportEvent>,
        codec: Box<dyn ProtocolCodec>,
    ) -> Self {
        let now = Instant::now();
        Self {
            sequence: SequenceTracker::new(config.eviction_window),
            latency: LatencyTracker::new(now),
            outage: OutageTracker::new(config.outage_timeout, config.recovery_hysteresis),
            histogram: HistogramAggregator::new(),
            tick: TickCounters::default(),
            totals: LinkTotals::default(),
            heartbeat_seen: false,
            started_at: now,
            sinks: Vec::new(),
            identity,
            config,
            transport,
            inbound,
            codec,
        }
    }

    fn id(&self) -> usize {
        self.identity.id
    }

    fn metrics_path(&self) -> Option<&Path> {
        self.sinks.iter().find_map(OpenSink::path)
    }

    fn send(&mut self, kind: MessageKind) -> Result<(), LinkError> {
        let bytes = self.codec.encode(&kind)?;
        self.transport.send(bytes)
    }

    fn announce(&mut self) -> Result<(), LinkError> {
        self.send(MessageKind::Heartbeat(Heartbeat::ground_station()))
    }

    /// Wait for the target's HEARTBEAT. Dialing links announce themselves
    /// once a second meanwhile; listeners stay quiet.
    async fn handshake(
        &mut self,
        listener: bool,
        cancel: &CancellationToken,
    ) -> Result<(), LinkError> {
        let id = self.id();
        info!("[{}] Waiting for heartbeat...", id);

        let deadline = sleep(self.config.handshake_timeout);
        tokio::pin!(deadline);
        let mut announce = interval(TICK);

        while !self.heartbeat_seen {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(LinkError::Cancelled),
                _ = &mut deadline => {
                    let err = LinkError::HandshakeTimeout {
                        system_id: self.config.target_system,
                        component_id: self.config.target_component,
                    };
                    error!("[{}] {}", id, err);
                    return Err(err);
                }
                _ = announce.tick(), if !listener => {
                    debug!("[{}] Sending HEARTBEAT to target", id);
                    if let Err(err) = self.announce() {
                        warn!("[{}] HEARTBEAT send error: {}", id, err);
                    }
                }
                event = self.inbound.recv() => match event {
                    Some(TransportEvent::Data(bytes)) => self.intake(&bytes, Instant::now()),
                    Some(TransportEvent::Closed(reason)) => return Err(LinkError::Closed(reason)),
                    None => return Err(LinkError::Closed("transport task has exited".to_string())),
                },
            }
        }

        info!(
            "[{}] Connected to system {}, component {}",
            id, self.config.target_system, self.config.target_component
        );
        Ok(())
    }

    /// Open outputs, request telemetry and mark the start of the run.
    async fn begin(&mut self) -> Result<(), LinkError> {
        let id = self.id();
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let timestamp = file_timestamp();
        let mut sinks = Vec::new();
        if self.config.write_csv {
            sinks.push(MetricsSink::Csv(self.config.output_dir.clone()));
        }
        sinks.extend(self.config.sinks.iter().cloned());
        for sink in &sinks {
            let open = sink.open(&self.identity, &timestamp).await?;
            if let Some(path) = open.path() {
                info!("[{}] Writing metrics to {}", id, path.display());
            }
            self.sinks.push(open);
        }

        self.request_streams();
        self.started_at = Instant::now();
        Ok(())
    }

    fn request_streams(&mut self) {
        let id = self.id();
        let rates = self.config.stream_rates.clone();
        for (category, rate_hz) in rates.into_iter().filter(|(_, rate)| *rate > 0) {
            let request = RequestDataStream {
                target_system: self.config.target_system,
                target_component: self.config.target_component,
                stream_id: category.stream_id(),
                rate_hz,
                start_stop: 1,
            };
            match self.send(MessageKind::RequestDataStream(request)) {
                Ok(()) => info!("[{}] Requested {} stream at {}Hz", id, category.name(), rate_hz),
                Err(err) => warn!("[{}] Failed to set {} rate: {}", id, category.name(), err),
            }
        }
    }

    fn intake(&mut self, bytes: &[u8], now: Instant) {
        for message in self.codec.decode(bytes) {
            self.accept(message, now);
        }
    }

    fn accept(&mut self, message: Message, now: Instant) {
        if !message.is_from(self.config.target_system, self.config.target_component) {
            return;
        }
        let id = self.id();

        self.tick.packets += 1;
        self.tick.bytes += message.len as u64;

        if let Some(OutageEvent::Recovered { duration }) = self.outage.on_packet(now) {
            info!("[{}] Link recovered after {}", id, format_duration(duration));
        }

        match &message.kind {
            MessageKind::Heartbeat(_) => self.heartbeat_seen = true,
            MessageKind::Timesync(sync) => {
                if let Some(rtt_ms) = self.latency.echo(sync.ts1, now) {
                    self.histogram.add_latency_sample(rtt_ms);
                }
            }
            _ => {}
        }

        if let SequenceOutcome::Gap { skipped } = self.sequence.track(message.sequence, now) {
            debug!(
                "[{}] Sequence gap: {} missing before {}",
                id, skipped, message.sequence
            );
        }
    }

    fn send_probe(&mut self) {
        let stamp = self.latency.probe(Instant::now());
        if let Err(err) = self.send(MessageKind::Timesync(Timesync::request(stamp))) {
            error!("[{}] TIMESYNC error: {}", self.id(), err);
        }
    }

    async fn metrics_tick(&mut self, now: Instant) {
        let id = self.id();

        let (outage, event) = self.outage.check(now);
        if let Some(OutageEvent::Started { silence }) = event {
            warn!("[{}] Link outage: no packets for {}", id, format_duration(silence));
        }

        self.sequence.sweep(now);
        let counts = self.sequence.take_counts();
        let record = MetricsRecord {
            elapsed_seconds: now.saturating_duration_since(self.started_at).as_secs_f64().round()
                as u64,
            total_packets: self.tick.packets,
            dropped_packets: counts.dropped,
            latency_ms: self.latency.current_ms(),
            bad_order_packets: counts.bad_order,
            bytes: self.tick.bytes,
            outage,
        };

        for sink in &mut self.sinks {
            if let Err(err) = sink.emit(&self.identity, &record).await {
                warn!("[{}] Failed to write metrics: {}", id, err);
            }
        }
        self.histogram.increment_total_seconds();

        info!(
            "[{}] {:4}s | Latency: {:3}ms | Pkts: {:3} | Drops: {:3} | BadOrder: {:3} | Bytes: {:5} | {}",
            id,
            record.elapsed_seconds,
            record.latency_ms.round() as i64,
            record.total_packets,
            record.dropped_packets,
            record.bad_order_packets,
            record.bytes,
            if outage { "OUTAGE" } else { "OK" }
        );

        self.totals.absorb(&record);
        self.tick = TickCounters::default();
    }

    async fn run(mut self, cancel: CancellationToken) -> Self {
        let id = self.id();
        let start = self.started_at;

        let mut probe = interval_at(start, TICK);
        let mut heartbeat = interval_at(start, TICK);
        let mut metrics = interval_at(start + TICK, TICK);
        for timer in [&mut probe, &mut heartbeat, &mut metrics] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = self.inbound.recv() => match event {
                    Some(TransportEvent::Data(bytes)) => self.intake(&bytes, Instant::now()),
                    Some(TransportEvent::Closed(reason)) => {
                        error!("[{}] Connection lost: {}", id, reason);
                        break;
                    }
                    None => {
                        error!("[{}] Connection lost: transport task has exited", id);
                        break;
                    }
                },
                _ = probe.tick() => self.send_probe(),
                _ = heartbeat.tick() => {
                    if let Err(err) = self.announce() {
                        error!("[{}] HEARTBEAT send error: {}", id, err);
                    }
                }
                _ = metrics.tick() => self.metrics_tick(Instant::now()).await,
            }
        }
        self
    }

    /// Tear down in order and build the report. Failures are collected,
    /// never returned.
    async fn finish(mut self, stopped_at: Instant) -> LinkReport {
        let id = self.id();
        let mut errors = Vec::new();

        self.totals.outage_seconds = self.outage.finish(stopped_at).as_secs_f64();

        self.inbound.close();
        if let Err(err) = self.transport.close().await {
            error!("[{}] Error closing transport: {}", id, err);
            errors.push(format!("closing transport: {err}"));
        }

        let mut metrics_path = None;
        for sink in self.sinks.drain(..) {
            if metrics_path.is_none() {
                metrics_path = sink.path().map(Path::to_path_buf);
            }
            if let Err(err) = sink.close().await {
                error!("[{}] Error closing metrics file: {}", id, err);
                errors.push(format!("closing metrics output: {err}"));
            }
        }

        let latency = self.latency.stats();
        let duration_seconds = stopped_at
            .saturating_duration_since(self.started_at)
            .as_secs_f64()
            .round() as u64;

        info!("[{}] Generating histogram...", id);
        self.histogram.set_total_seconds(duration_seconds);
        let histogram_path = match self.histogram.generate(
            &self.config.output_dir,
            &self.identity.sanitized,
            &file_timestamp(),
        ) {
            Ok(path) => {
                info!("[{}] Histogram saved to {}", id, path.display());
                Some(path)
            }
            Err(err) => {
                error!("[{}] Error generating histogram: {}", id, err);
                errors.push(format!("generating histogram: {err}"));
                None
            }
        };

        let report = LinkReport {
            link: self.identity,
            totals: self.totals,
            latency,
            duration_seconds,
            metrics_path,
            histogram_path,
            errors,
        };
        log_summary(&report);
        report
    }
}

fn log_summary(report: &LinkReport) {
    let id = report.link.id;
    let totals = &report.totals;

    info!("[{}] Final Summary:", id);
    info!("[{}]   Total Packets: {}", id, totals.total_packets);
    match (totals.drop_percent(), totals.bad_order_percent()) {
        (Some(drops), Some(bad_order)) => {
            info!("[{}]   Total Drops: {} ({:.2}%)", id, totals.dropped_packets, drops);
            info!(
                "[{}]   Total Bad Order: {} ({:.2}%)",
                id, totals.bad_order_packets, bad_order
            );
        }
        _ => {
            info!("[{}]   Total Drops: {}", id, totals.dropped_packets);
            info!("[{}]   Total Bad Order: {}", id, totals.bad_order_packets);
        }
    }
    match report.latency.mean_ms {
        Some(mean) => info!("[{}]   Mean Latency: {:.2}ms", id, mean),
        None => info!("[{}]   Mean Latency: N/A", id),
    }
    match report.latency.median_ms {
        Some(median) => info!("[{}]   Median Latency: {:.2}ms", id, median),
        None => info!("[{}]   Median Latency: N/A", id),
    }
    match report.outage_percent() {
        Some(percent) => info!(
            "[{}]   Total Outage Time: {:.2}s ({:.2}%)",
            id, totals.outage_seconds, percent
        ),
        None => info!("[{}]   Total Outage Time: {:.2}s", id, totals.outage_seconds),
    }
}
