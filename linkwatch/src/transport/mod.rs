//! Byte transports for the five descriptor kinds.
//!
//! Every open channel is backed by one I/O task that owns the socket or
//! device. Inbound bytes and disconnects travel up a bounded channel as
//! [`TransportEvent`]s; outbound bytes travel down a second bounded channel.
//! The monitor never touches the socket directly.

mod serial;
mod tcp;
mod udp;

use std::net::SocketAddr;
use std::time::Duration;

use linkwatch_types::LinkDescriptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::LinkError;

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw inbound bytes, in arrival order.
    Data(Vec<u8>),
    /// The transport failed or the remote hung up. No further events follow.
    Closed(String),
}

/// Tuning for [`TransportChannel::open`].
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Upper bound on connect / bind / device open.
    pub open_timeout: Duration,
    /// Capacity of the inbound and outbound queues.
    pub queue_capacity: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            open_timeout: Duration::from_secs(10),
            queue_capacity: 256,
        }
    }
}

/// Handle to an open transport.
#[derive(Debug)]
pub struct TransportChannel {
    descriptor: LinkDescriptor,
    outbound: mpsc::Sender<Vec<u8>>,
    peer: watch::Receiver<Option<SocketAddr>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// The I/O task's side of a channel.
struct ChannelIo {
    inbound: mpsc::Sender<TransportEvent>,
    outbound: mpsc::Receiver<Vec<u8>>,
    peer: watch::Sender<Option<SocketAddr>>,
    cancel: CancellationToken,
}

impl ChannelIo {
    /// Forward inbound bytes. Returns false once nobody is listening or the
    /// channel is being closed.
    async fn deliver(&self, bytes: &[u8]) -> bool {
        self.emit(TransportEvent::Data(bytes.to_vec())).await
    }

    async fn closed(&self, reason: impl Into<String>) {
        self.emit(TransportEvent::Closed(reason.into())).await;
    }

    /// Queue an event. Gives up once the channel is cancelled, even if the
    /// queue is full.
    async fn emit(&self, event: TransportEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.inbound.send(event) => sent.is_ok(),
        }
    }

    fn learn_peer(&self, addr: SocketAddr) {
        self.peer.send_if_modified(|peer| {
            if *peer == Some(addr) {
                false
            } else {
                *peer = Some(addr);
                true
            }
        });
    }
}

impl TransportChannel {
    /// Open the transport named by `descriptor` and spawn its I/O task.
    ///
    /// Returns the channel handle plus the receiver for inbound events.
    pub async fn open(
        descriptor: &LinkDescriptor,
        options: TransportOptions,
        parent: &CancellationToken,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent>), LinkError> {
        let (inbound_tx, inbound_rx) = mpsc::channel(options.queue_capacity);
        let (outbound_tx, outbound_rx) = mpsc::channel(options.queue_capacity);
        let (peer_tx, peer_rx) = watch::channel(None);
        let cancel = parent.child_token();

        let io = ChannelIo {
            inbound: inbound_tx,
            outbound: outbound_rx,
            peer: peer_tx,
            cancel: cancel.clone(),
        };

        let open_error = |source: std::io::Error| LinkError::Open {
            descriptor: descriptor.to_string(),
            source,
        };
        let limit = options.open_timeout;

        let task = match descriptor {
            LinkDescriptor::UdpOut { host, port } => {
                let (socket, peer) = bounded(descriptor, limit, udp::dial(host, *port))
                    .await?
                    .map_err(open_error)?;
                io.learn_peer(peer);
                tokio::spawn(udp::run(socket, false, io))
            }
            LinkDescriptor::UdpIn { bind, port } => {
                let socket = bounded(descriptor, limit, udp::bind(bind, *port))
                    .await?
                    .map_err(open_error)?;
                tokio::spawn(udp::run(socket, true, io))
            }
            LinkDescriptor::TcpOut { host, port } => {
                let (stream, peer) = bounded(descriptor, limit, tcp::dial(host, *port))
                    .await?
                    .map_err(open_error)?;
                io.learn_peer(peer);
                tokio::spawn(run_stream(stream, io))
            }
            LinkDescriptor::TcpIn { bind, port } => {
                let listener = bounded(descriptor, limit, tcp::bind(bind, *port))
                    .await?
                    .map_err(open_error)?;
                tokio::spawn(tcp::accept_first(listener, io))
            }
            LinkDescriptor::Serial { path, baud } => {
                let port = serial::open(path, *baud).map_err(open_error)?;
                tokio::spawn(run_stream(port, io))
            }
        };

        debug!("Opened {} transport for {}", descriptor.kind(), descriptor);

        let channel = Self {
            descriptor: descriptor.clone(),
            outbound: outbound_tx,
            peer: peer_rx,
            cancel,
            task: Some(task),
        };
        Ok((channel, inbound_rx))
    }

    /// Queue bytes for sending.
    ///
    /// Never waits: a full queue drops the bytes and reports
    /// [`LinkError::QueueFull`].
    pub fn send(&self, bytes: Vec<u8>) -> Result<(), LinkError> {
        self.outbound.try_send(bytes).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => LinkError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => {
                LinkError::Closed("transport task has exited".to_string())
            }
        })
    }

    /// Stop the I/O task and release the socket. Safe to call repeatedly.
    pub async fn close(&mut self) -> Result<(), LinkError> {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }

    /// Whether the I/O task is still alive.
    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// The remote address, once known. Always `None` for serial links.
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.borrow()
    }

    /// The descriptor this channel was opened from.
    pub fn descriptor(&self) -> &LinkDescriptor {
        &self.descriptor
    }

    /// A channel with no I/O task behind it, for exercising the monitor.
    #[cfg(test)]
    pub(crate) fn detached(
        descriptor: LinkDescriptor,
    ) -> (
        Self,
        mpsc::Sender<TransportEvent>,
        mpsc::Receiver<TransportEvent>,
        mpsc::Receiver<Vec<u8>>,
    ) {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        let (_, peer_rx) = watch::channel(None);
        let channel = Self {
            descriptor,
            outbound: outbound_tx,
            peer: peer_rx,
            cancel: CancellationToken::new(),
            task: None,
        };
        (channel, inbound_tx, inbound_rx, outbound_rx)
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn bounded<T>(
    descriptor: &LinkDescriptor,
    timeout: Duration,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, LinkError> {
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| LinkError::OpenTimeout {
            descriptor: descriptor.to_string(),
            timeout,
        })
}

/// Pump a byte stream (TCP connection or serial port) until cancelled or
/// the stream fails.
async fn run_stream<S>(stream: S, mut io: ChannelIo)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            _ = io.cancel.cancelled() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    io.closed("remote closed the connection").await;
                    break;
                }
                Ok(n) => {
                    if !io.deliver(&buf[..n]).await {
                        break;
                    }
                }
                Err(err) => {
                    io.closed(format!("read failed: {err}")).await;
                    break;
                }
            },
            out = io.outbound.recv() => match out {
                Some(bytes) => {
                    trace!("writing {} bytes", bytes.len());
                    if let Err(err) = writer.write_all(&bytes).await {
                        io.closed(format!("write failed: {err}")).await;
                        break;
                    }
                }
                None => break,
            },
        }
    }

    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stream_pump_forwards_both_directions() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (peer_tx, _peer_rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let io = ChannelIo {
            inbound: inbound_tx,
            outbound: outbound_rx,
            peer: peer_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run_stream(local, io));

        remote.write_all(b"abc").await.unwrap();
        assert_eq!(
            inbound_rx.recv().await,
            Some(TransportEvent::Data(b"abc".to_vec()))
        );

        outbound_tx.send(b"xyz".to_vec()).await.unwrap();
        let mut got = [0u8; 3];
        remote.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"xyz");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stream_pump_reports_hangup() {
        let (local, remote) = tokio::io::duplex(64);
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
        let (_outbound_tx, outbound_rx) = mpsc::channel(8);
        let (peer_tx, _peer_rx) = watch::channel(None);
        let io = ChannelIo {
            inbound: inbound_tx,
            outbound: outbound_rx,
            peer: peer_tx,
            cancel: CancellationToken::new(),
        };
        let task = tokio::spawn(run_stream(local, io));

        drop(remote);
        assert!(matches!(
            inbound_rx.recv().await,
            Some(TransportEvent::Closed(_))
        ));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let descriptor: LinkDescriptor = "udpin:127.0.0.1:0".parse().unwrap();
        let parent = CancellationToken::new();
        let (mut channel, _events) =
            TransportChannel::open(&descriptor, TransportOptions::default(), &parent)
                .await
                .unwrap();
        assert!(channel.is_open());
        channel.send(vec![1, 2, 3]).unwrap();

        channel.close().await.unwrap();
        channel.close().await.unwrap();
        assert!(!channel.is_open());
        assert!(matches!(channel.send(vec![1]), Err(LinkError::Closed(_))));
    }

    #[tokio::test]
    async fn close_does_not_wait_on_a_full_inbound_queue() {
        let port = std::net::UdpSocket::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let descriptor: LinkDescriptor = format!("udpin:127.0.0.1:{port}").parse().unwrap();
        let options = TransportOptions {
            queue_capacity: 4,
            ..TransportOptions::default()
        };
        let (mut channel, events) =
            TransportChannel::open(&descriptor, options, &CancellationToken::new())
                .await
                .unwrap();

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for i in 0..20u8 {
            sender
                .send_to(&[i; 8], ("127.0.0.1", port))
                .await
                .unwrap();
        }
        // Let the I/O task fill the queue and block on the next datagram.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let closed = tokio::time::timeout(Duration::from_secs(3), channel.close()).await;
        assert!(closed.is_ok(), "close hung on a full inbound queue");
        assert!(closed.unwrap().is_ok());
        assert!(!channel.is_open());
        drop(events);
    }

    #[tokio::test]
    async fn tcp_listener_drops_bytes_queued_before_a_client() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let descriptor: LinkDescriptor = format!("tcpin:127.0.0.1:{port}").parse().unwrap();
        let (mut channel, mut events) = TransportChannel::open(
            &descriptor,
            TransportOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert!(channel.peer().is_none());

        channel.send(b"early".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut client = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        let local = client.local_addr().unwrap();
        while channel.peer().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(channel.peer(), Some(local));

        channel.send(b"late".to_vec()).unwrap();
        let mut got = [0u8; 4];
        client.read_exact(&mut got).await.unwrap();
        assert_eq!(&got, b"late");
        let mut extra = [0u8; 1];
        let more = tokio::time::timeout(Duration::from_millis(100), client.read(&mut extra)).await;
        assert!(more.is_err(), "nothing else should have been sent");

        client.write_all(b"hi").await.unwrap();
        assert_eq!(events.recv().await, Some(TransportEvent::Data(b"hi".to_vec())));

        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_tcp_peer_fails_to_open() {
        // Grab a free port and release it so nothing is listening there.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let descriptor: LinkDescriptor = format!("tcp:127.0.0.1:{port}").parse().unwrap();
        let err = TransportChannel::open(
            &descriptor,
            TransportOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LinkError::Open { .. }));
    }

    #[tokio::test]
    async fn missing_serial_device_fails_to_open() {
        let descriptor: LinkDescriptor = "/dev/linkwatch-does-not-exist:57600".parse().unwrap();
        let err = TransportChannel::open(
            &descriptor,
            TransportOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LinkError::Open { .. }));
    }
}
