//! TCP + UDP transport.
//!
//! Each channel gets its own TCP listener. A peer identifies itself with the
//! first line it sends; every following line is one JSON frame, forwarded
//! verbatim to the event loop. Outbound frames go through a per-connection
//! writer task so `Outbound` calls never wait on the socket.
//!
//! Heartbeats travel over UDP as bincode-encoded `HeartbeatMessage`s.

use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;

use super::Outbound;
use super::types::Channel;
use crate::config::BrokerConfig;
use crate::controller::protocol::{Inbound, InboundSender};
use crate::heartbeat::types::HeartbeatMessage;
use crate::message::types::{Identity, Message};

type PeerTable = DashMap<(Channel, Identity), mpsc::UnboundedSender<String>>;

/// Addresses actually bound, which may differ from the configured ports when
/// those are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub registration: SocketAddr,
    pub client: SocketAddr,
    pub queue: SocketAddr,
    pub notification: SocketAddr,
    pub monitor: SocketAddr,
    pub heartbeat: SocketAddr,
}

pub struct NetTransport {
    peers: Arc<PeerTable>,
    heartbeat: Arc<UdpSocket>,
}

impl NetTransport {
    /// Binds every channel and starts the accept and receive loops.
    pub async fn bind(config: &BrokerConfig, inbound: InboundSender) -> Result<(Self, BoundAddrs)> {
        let peers: Arc<PeerTable> = Arc::new(DashMap::new());

        let registration = listen(
            config.addr(config.registration_port),
            Channel::Registration,
            &peers,
            &inbound,
        )
        .await?;
        let client = listen(config.addr(config.client_port), Channel::Client, &peers, &inbound).await?;
        let queue = listen(config.addr(config.queue_port), Channel::Queue, &peers, &inbound).await?;
        let notification = listen(
            config.addr(config.notification_port),
            Channel::Notification,
            &peers,
            &inbound,
        )
        .await?;
        let monitor = listen(config.addr(config.monitor_port), Channel::Monitor, &peers, &inbound).await?;

        let socket = Arc::new(UdpSocket::bind(config.addr(config.heartbeat_port)).await?);
        let heartbeat = socket.local_addr()?;
        tracing::info!("Heartbeat channel listening on {}", heartbeat);

        {
            let socket = socket.clone();
            tokio::spawn(async move {
                heartbeat_receive_loop(socket, inbound).await;
            });
        }

        let bound = BoundAddrs {
            registration,
            client,
            queue,
            notification,
            monitor,
            heartbeat,
        };

        Ok((
            Self {
                peers,
                heartbeat: socket,
            },
            bound,
        ))
    }

    /// Number of live connections on a channel.
    pub fn connection_count(&self, channel: Channel) -> usize {
        self.peers.iter().filter(|entry| entry.key().0 == channel).count()
    }

    fn deliver(&self, key: &(Channel, Identity), frame: String) {
        match self.peers.get(key) {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    tracing::warn!("Connection to {} on {} is closing", key.1, key.0);
                }
            }
            None => {
                tracing::warn!("No connection for {} on {} channel", key.1, key.0);
            }
        }
    }
}

impl Outbound for NetTransport {
    fn send(&mut self, channel: Channel, to: &Identity, message: &Message) {
        match message.pack() {
            Ok(frame) => self.deliver(&(channel, to.clone()), frame),
            Err(e) => tracing::error!("Failed to pack {}: {}", message.msg_type(), e),
        }
    }

    fn publish(&mut self, channel: Channel, message: &Message) {
        let frame = match message.pack() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("Failed to pack {}: {}", message.msg_type(), e);
                return;
            }
        };

        for entry in self.peers.iter() {
            if entry.key().0 == channel && entry.value().send(frame.clone()).is_err() {
                tracing::debug!("Subscriber {} is closing", entry.key().1);
            }
        }
    }

    fn ping(&mut self, heart: &Identity, beat: u64) {
        let addr: SocketAddr = match heart.0.parse() {
            Ok(addr) => addr,
            Err(_) => {
                tracing::warn!("Heart identity {} is not a socket address", heart);
                return;
            }
        };

        match bincode::serialize(&HeartbeatMessage::Ping { beat }) {
            Ok(encoded) => {
                if let Err(e) = self.heartbeat.try_send_to(&encoded, addr) {
                    tracing::warn!("Failed to ping {}: {}", heart, e);
                }
            }
            Err(e) => tracing::error!("Failed to serialize HeartbeatMessage::Ping: {}", e),
        }
    }
}

async fn listen(
    addr: SocketAddr,
    channel: Channel,
    peers: &Arc<PeerTable>,
    inbound: &InboundSender,
) -> Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("{} channel listening on {}", channel, local);

    let peers = peers.clone();
    let inbound = inbound.clone();
    tokio::spawn(async move {
        accept_loop(listener, channel, peers, inbound).await;
    });

    Ok(local)
}

async fn accept_loop(
    listener: TcpListener,
    channel: Channel,
    peers: Arc<PeerTable>,
    inbound: InboundSender,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!("Accepted {} connection from {}", channel, addr);
                let peers = peers.clone();
                let inbound = inbound.clone();
                tokio::spawn(async move {
                    serve_peer(stream, channel, peers, inbound).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept on {} channel: {}", channel, e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn serve_peer(
    stream: TcpStream,
    channel: Channel,
    peers: Arc<PeerTable>,
    inbound: InboundSender,
) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let identity = match lines.next_line().await {
        Ok(Some(line)) if !line.trim().is_empty() => Identity::new(line.trim()),
        _ => {
            tracing::warn!("Peer on {} channel closed before identifying", channel);
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let key = (channel, identity.clone());
    if peers.insert(key.clone(), tx.clone()).is_some() {
        tracing::warn!("{} reconnected on {} channel", identity, channel);
    }

    let writer = tokio::spawn(async move {
        while let Some(mut frame) = rx.recv().await {
            frame.push('\n');
            if let Err(e) = write.write_all(frame.as_bytes()).await {
                tracing::debug!("Write failed: {}", e);
                break;
            }
        }
    });

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let frame = Inbound::Frame {
                    channel,
                    identity: identity.clone(),
                    payload: line,
                };
                if inbound.send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Read from {} on {} channel failed: {}", identity, channel, e);
                break;
            }
        }
    }

    // a newer connection under the same identity keeps its entry
    peers.remove_if(&key, |_, current| current.same_channel(&tx));
    writer.abort();
    tracing::debug!("{} disconnected from {} channel", identity, channel);
}

async fn heartbeat_receive_loop(socket: Arc<UdpSocket>, inbound: InboundSender) {
    let mut buf = vec![0u8; 65536];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, src)) => match bincode::deserialize::<HeartbeatMessage>(&buf[..len]) {
                Ok(HeartbeatMessage::Pong { heart, beat }) => {
                    if inbound.send(Inbound::Heartbeat { heart, beat }).is_err() {
                        break;
                    }
                }
                Ok(HeartbeatMessage::Ping { .. }) => {
                    tracing::debug!("Ignoring ping from {}", src);
                }
                Err(e) => {
                    tracing::warn!("Failed to deserialize heartbeat from {}: {}", src, e);
                }
            },
            Err(e) => {
                tracing::error!("Failed to receive heartbeat packet: {}", e);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}
