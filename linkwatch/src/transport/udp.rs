use std::io;
use std::net::SocketAddr;

use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, trace, warn};

use super::ChannelIo;

const MAX_DATAGRAM: usize = 65_536;

/// Resolve the remote and bind an ephemeral local socket of the same family.
pub(super) async fn dial(host: &str, port: u16) -> io::Result<(UdpSocket, SocketAddr)> {
    let peer = lookup_host((host, port)).await?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"))
    })?;
    let local: SocketAddr = if peer.is_ipv4() {
        ([0u8; 4], 0).into()
    } else {
        ([0u16; 8], 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    Ok((socket, peer))
}

pub(super) async fn bind(addr: &str, port: u16) -> io::Result<UdpSocket> {
    UdpSocket::bind((addr, port)).await
}

/// Datagram pump. With `learn_peer` set, replies go to whoever sent last and
/// nothing is sent until someone has.
pub(super) async fn run(socket: UdpSocket, learn_peer: bool, mut io: ChannelIo) {
    let mut peer = *io.peer.borrow();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = io.cancel.cancelled() => break,
            recv = socket.recv_from(&mut buf) => match recv {
                Ok((n, from)) => {
                    if learn_peer && peer != Some(from) {
                        debug!("UDP peer is now {}", from);
                        peer = Some(from);
                        io.learn_peer(from);
                    }
                    if !io.deliver(&buf[..n]).await {
                        break;
                    }
                }
                // ICMP unreachable from an earlier send; the remote may
                // simply not be up yet.
                Err(err) if err.kind() == io::ErrorKind::ConnectionRefused => {
                    trace!("ignoring {}", err);
                }
                Err(err) => {
                    io.closed(format!("receive failed: {err}")).await;
                    break;
                }
            },
            out = io.outbound.recv() => match out {
                Some(bytes) => match peer {
                    Some(addr) => {
                        if let Err(err) = socket.send_to(&bytes, addr).await {
                            warn!("UDP send to {} failed: {}", addr, err);
                        }
                    }
                    None => trace!("no UDP peer yet, dropping {} bytes", bytes.len()),
                },
                None => break,
            },
        }
    }
}
