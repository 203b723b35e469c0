// One view's connection task: connect, handshake, pump frames, reconnect
//
// States: Connecting -> Handshaking -> Open -> Closing -> Closed, then back
// to Connecting unless the manager asked us to stop. A connection that
// reached Open at least once reconnects immediately; one that never did
// waits out the backoff first.
use std::time::Instant;

use futures_util::{SinkExt, StreamExt};
use protocol::packets::{ClientMessage, ServerMessage};
use protocol::{Permutation, PREAMBLE};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{ConnectionState, Control, LinkId, NetEvent, NetEventKind};
use crate::config::NetworkConfig;
use crate::error::ClientError;
use crate::game::ViewId;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Why a session ended.
enum Exit {
    /// The manager closed the view or went away.
    Shutdown,
    /// New address; reconnect right away.
    Retarget(String),
    /// Transport or protocol failure.
    Dropped,
}

pub(crate) struct Connection {
    view: ViewId,
    link: LinkId,
    url: String,
    settings: NetworkConfig,
    events: mpsc::UnboundedSender<NetEvent>,
    control: mpsc::UnboundedReceiver<Control>,
    /// Reached `Open` at least once on the current address.
    opened: bool,
}

impl Connection {
    pub(crate) fn new(
        view: ViewId,
        link: LinkId,
        url: String,
        settings: NetworkConfig,
        events: mpsc::UnboundedSender<NetEvent>,
        control: mpsc::UnboundedReceiver<Control>,
    ) -> Self {
        Self {
            view,
            link,
            url,
            settings,
            events,
            control,
            opened: false,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let exit = self.session().await;
            self.emit(NetEventKind::State(ConnectionState::Closed));

            match exit {
                Exit::Shutdown => break,
                Exit::Retarget(url) => {
                    self.url = url;
                    self.opened = false;
                }
                Exit::Dropped if self.opened => {
                    info!(view = %self.view, "connection lost, reconnecting");
                }
                Exit::Dropped => {
                    warn!(
                        view = %self.view,
                        "connection failed, retrying in {:?}",
                        self.settings.backoff()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.settings.backoff()) => {}
                        exit = next_control(&mut self.control) => match exit {
                            Exit::Retarget(url) => self.url = url,
                            _ => break,
                        },
                    }
                }
            }
        }
        debug!(view = %self.view, "connection task finished");
    }

    fn emit(&self, kind: NetEventKind) {
        let _ = self.events.send(NetEvent {
            view: self.view,
            link: self.link,
            kind,
        });
    }

    async fn session(&mut self) -> Exit {
        self.emit(NetEventKind::State(ConnectionState::Connecting));
        let url = self.url.clone();
        let connect = tokio::time::timeout(self.settings.connect_timeout(), connect_async(url));
        let socket = tokio::select! {
            result = connect => match result {
                Ok(Ok((socket, _))) => socket,
                Ok(Err(e)) => {
                    warn!(view = %self.view, "connect to {} failed: {}", self.url, e);
                    return Exit::Dropped;
                }
                Err(_) => {
                    let e = ClientError::Timeout(self.settings.connect_timeout(), "connect");
                    warn!(view = %self.view, "{}", e);
                    return Exit::Dropped;
                }
            },
            exit = next_control(&mut self.control) => return exit,
        };

        self.emit(NetEventKind::State(ConnectionState::Handshaking));
        let (mut write, mut read) = socket.split();
        let handshake = tokio::time::timeout(
            self.settings.handshake_timeout(),
            handshake(&mut write, &mut read),
        );
        let perm = tokio::select! {
            result = handshake => match result {
                Ok(Ok(perm)) => perm,
                Ok(Err(e)) => {
                    warn!(view = %self.view, "handshake failed: {}", e);
                    return Exit::Dropped;
                }
                Err(_) => {
                    let e = ClientError::Timeout(self.settings.handshake_timeout(), "handshake");
                    warn!(view = %self.view, "{}", e);
                    return Exit::Dropped;
                }
            },
            exit = next_control(&mut self.control) => return exit,
        };

        info!(view = %self.view, url = %self.url, "connection open");
        self.opened = true;
        self.emit(NetEventKind::State(ConnectionState::Open));

        let exit = self.pump(&mut write, &mut read, &perm).await;

        self.emit(NetEventKind::State(ConnectionState::Closing));
        if let Err(e) = write.close().await {
            trace!(view = %self.view, "close: {}", e);
        }
        exit
    }

    /// Frame loop of an open connection.
    async fn pump(
        &mut self,
        write: &mut futures_util::stream::SplitSink<Socket, Message>,
        read: &mut futures_util::stream::SplitStream<Socket>,
        perm: &Permutation,
    ) -> Exit {
        let mut heartbeat = tokio::time::interval(self.settings.heartbeat());
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut pending_ping: Option<Instant> = None;

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Binary(data))) => match ServerMessage::decode(&data, perm) {
                        Ok(Some(message)) => {
                            if matches!(message, ServerMessage::ServerStats(_)) {
                                if let Some(sent) = pending_ping.take() {
                                    self.emit(NetEventKind::Latency(Some(sent.elapsed())));
                                }
                            }
                            self.emit(NetEventKind::Message(message));
                        }
                        Ok(None) => {
                            trace!(view = %self.view, "ignoring unknown opcode");
                        }
                        Err(e) => {
                            warn!(view = %self.view, "malformed packet: {}", e);
                            return Exit::Dropped;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!(view = %self.view, "server closed the connection");
                        return Exit::Dropped;
                    }
                    Some(Err(e)) => {
                        warn!(view = %self.view, "websocket error: {}", e);
                        return Exit::Dropped;
                    }
                    _ => {}
                },
                _ = heartbeat.tick() => {
                    if pending_ping.is_some() {
                        self.emit(NetEventKind::Latency(None));
                    }
                    pending_ping = Some(Instant::now());
                    if let Err(e) = write.send(Message::binary(ClientMessage::Ping.encode(perm))).await {
                        warn!(view = %self.view, "failed to send heartbeat: {}", e);
                        return Exit::Dropped;
                    }
                }
                control = self.control.recv() => match control {
                    Some(Control::Send(message)) => {
                        if let Err(e) = write.send(Message::binary(message.encode(perm))).await {
                            warn!(view = %self.view, "failed to send {:?}: {}", message.opcode(), e);
                            return Exit::Dropped;
                        }
                    }
                    Some(Control::Retarget(url)) => return Exit::Retarget(url),
                    Some(Control::Close) | None => return Exit::Shutdown,
                },
            }
        }
    }
}

/// Send the preamble and wait for the permutation table.
async fn handshake(
    write: &mut futures_util::stream::SplitSink<Socket, Message>,
    read: &mut futures_util::stream::SplitStream<Socket>,
) -> Result<Permutation, ClientError> {
    write.send(Message::binary(PREAMBLE.to_vec())).await?;
    loop {
        match read.next().await {
            Some(Ok(Message::Binary(table))) => return Ok(Permutation::from_table(&table)?),
            Some(Ok(Message::Close(_))) | None => return Err(ClientError::HandshakeClosed),
            Some(Err(e)) => return Err(e.into()),
            Some(Ok(_)) => {}
        }
    }
}

/// Wait for a control message that ends the current attempt. Outgoing
/// messages are dropped while the connection is not open.
async fn next_control(control: &mut mpsc::UnboundedReceiver<Control>) -> Exit {
    loop {
        match control.recv().await {
            Some(Control::Send(message)) => {
                debug!("not connected, dropping {:?}", message.opcode());
            }
            Some(Control::Retarget(url)) => return Exit::Retarget(url),
            Some(Control::Close) | None => return Exit::Shutdown,
        }
    }
}
