//! A scripted vehicle for driving monitors over loopback sockets.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use linkwatch::{MavlinkCodec, ProtocolCodec};
use linkwatch_types::{Heartbeat, MessageKind, Timesync};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What the vehicle has seen from the ground station.
#[derive(Debug, Default, Clone)]
pub struct Seen {
    pub heartbeats: usize,
    pub timesync_requests: usize,
    pub stream_requests: Vec<(u8, u16)>,
}

#[derive(Debug, Clone)]
pub struct VehicleOptions {
    pub system_id: u8,
    pub component_id: u8,
    pub period: Duration,
    /// Sequence numbers never sent (each skipped once).
    pub skip: Vec<u8>,
    pub answer_timesync: bool,
    /// Hang up after this long (TCP only).
    pub hang_up_after: Option<Duration>,
}

impl Default for VehicleOptions {
    fn default() -> Self {
        Self {
            system_id: 1,
            component_id: 1,
            period: Duration::from_millis(100),
            skip: Vec::new(),
            answer_timesync: true,
            hang_up_after: None,
        }
    }
}

struct Responder {
    codec: MavlinkCodec,
    sequence: u8,
    options: VehicleOptions,
    seen: Arc<Mutex<Seen>>,
}

impl Responder {
    fn new(options: VehicleOptions, seen: Arc<Mutex<Seen>>) -> Self {
        Self {
            codec: MavlinkCodec::new(options.system_id, options.component_id),
            sequence: 0,
            options,
            seen,
        }
    }

    fn frame(&mut self, kind: &MessageKind) -> Vec<u8> {
        while let Some(pos) = self.options.skip.iter().position(|s| *s == self.sequence) {
            self.options.skip.remove(pos);
            self.sequence = self.sequence.wrapping_add(1);
        }
        self.codec.set_sequence(self.sequence);
        self.sequence = self.sequence.wrapping_add(1);
        self.codec.encode(kind).unwrap()
    }

    fn heartbeat(&mut self) -> Vec<u8> {
        self.frame(&MessageKind::Heartbeat(Heartbeat::default()))
    }

    fn handle(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut replies = Vec::new();
        for message in self.codec.decode(bytes) {
            match message.kind {
                MessageKind::Heartbeat(_) => self.seen.lock().unwrap().heartbeats += 1,
                MessageKind::Timesync(sync) if sync.tc1 == 0 => {
                    self.seen.lock().unwrap().timesync_requests += 1;
                    if self.options.answer_timesync {
                        let reply = Timesync {
                            tc1: 1_000,
                            ts1: sync.ts1,
                        };
                        replies.push(self.frame(&MessageKind::Timesync(reply)));
                    }
                }
                MessageKind::RequestDataStream(req) => {
                    self.seen
                        .lock()
                        .unwrap()
                        .stream_requests
                        .push((req.stream_id, req.rate_hz));
                }
                _ => {}
            }
        }
        replies
    }
}

pub struct Vehicle {
    pub addr: SocketAddr,
    pub seen: Arc<Mutex<Seen>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Vehicle {
    pub fn seen(&self) -> Seen {
        self.seen.lock().unwrap().clone()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }
}

/// UDP vehicle on an ephemeral port. It starts talking once the ground
/// station has sent something, or straight away to `target` when given.
pub async fn udp_vehicle(options: VehicleOptions, target: Option<SocketAddr>) -> Vehicle {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let cancel = CancellationToken::new();

    let mut responder = Responder::new(options.clone(), seen.clone());
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let mut peer = target;
        let mut tick = interval(options.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; 2048];
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tick.tick() => {
                    if let Some(to) = peer {
                        let _ = socket.send_to(&responder.heartbeat(), to).await;
                    }
                }
                recv = socket.recv_from(&mut buf) => {
                    let Ok((n, from)) = recv else { continue };
                    peer = Some(from);
                    for reply in responder.handle(&buf[..n]) {
                        let _ = socket.send_to(&reply, from).await;
                    }
                }
            }
        }
    });

    Vehicle {
        addr,
        seen,
        cancel,
        task,
    }
}

/// TCP vehicle accepting one ground station connection.
pub async fn tcp_vehicle(options: VehicleOptions) -> Vehicle {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Seen::default()));
    let cancel = CancellationToken::new();

    let responder = Responder::new(options.clone(), seen.clone());
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let accepted = tokio::select! {
            _ = token.cancelled() => return,
            accepted = listener.accept() => accepted,
        };
        let Ok((stream, _)) = accepted else { return };
        serve_stream(stream, responder, options, token).await;
    });

    Vehicle {
        addr,
        seen,
        cancel,
        task,
    }
}

/// TCP vehicle that dials the ground station at `addr`, retrying until
/// something is listening there.
pub async fn tcp_vehicle_dialing(options: VehicleOptions, addr: SocketAddr) -> Vehicle {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let cancel = CancellationToken::new();

    let responder = Responder::new(options.clone(), seen.clone());
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        let stream = loop {
            tokio::select! {
                _ = token.cancelled() => return,
                connected = TcpStream::connect(addr) => match connected {
                    Ok(stream) => break stream,
                    Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
                },
            }
        };
        serve_stream(stream, responder, options, token).await;
    });

    Vehicle {
        addr,
        seen,
        cancel,
        task,
    }
}

async fn serve_stream(
    mut stream: TcpStream,
    mut responder: Responder,
    options: VehicleOptions,
    token: CancellationToken,
) {
    let hang_up = tokio::time::sleep(options.hang_up_after.unwrap_or(Duration::from_secs(3600)));
    tokio::pin!(hang_up);
    let mut tick = interval(options.period);
    let mut buf = vec![0u8; 2048];
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = &mut hang_up => break,
            _ = tick.tick() => {
                if stream.write_all(&responder.heartbeat()).await.is_err() {
                    break;
                }
            }
            read = stream.read(&mut buf) => {
                let n = match read {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for reply in responder.handle(&buf[..n]) {
                    if stream.write_all(&reply).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// A loopback UDP port that was free a moment ago.
pub fn free_udp_port() -> u16 {
    std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// A loopback TCP port that was free a moment ago.
pub fn free_tcp_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
