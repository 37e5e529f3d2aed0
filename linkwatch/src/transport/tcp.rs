use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{info, trace, warn};

use super::{run_stream, ChannelIo};

pub(super) async fn dial(host: &str, port: u16) -> io::Result<(TcpStream, SocketAddr)> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    Ok((stream, peer))
}

pub(super) async fn bind(addr: &str, port: u16) -> io::Result<TcpListener> {
    TcpListener::bind((addr, port)).await
}

/// Wait for the first client, then pump its stream. Outbound bytes queued
/// before anyone connects are discarded.
pub(super) async fn accept_first(listener: TcpListener, mut io: ChannelIo) {
    let stream = loop {
        tokio::select! {
            _ = io.cancel.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY for {}: {}", addr, err);
                    }
                    info!("TCP client connected from {}", addr);
                    io.learn_peer(addr);
                    break stream;
                }
                Err(err) => warn!("TCP accept failed: {}", err),
            },
            out = io.outbound.recv() => match out {
                Some(bytes) => trace!("no TCP client yet, dropping {} bytes", bytes.len()),
                None => return,
            },
        }
    };

    drop(listener);
    run_stream(stream, io).await;
}
