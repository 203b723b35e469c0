// Connection manager: one WebSocket task per view
//
// Each task owns its socket and permutation table and reports back over a
// single event channel. The runtime owns the manager and is the only
// consumer of events, so nothing here is shared across threads.
mod connection;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use protocol::packets::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::game::ViewId;
use connection::Connection;

/// Lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connecting,
    Handshaking,
    Open,
    Closing,
    #[default]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        })
    }
}

/// Identifies one `open` call; events from replaced links are stale.
pub type LinkId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum NetEventKind {
    State(ConnectionState),
    Message(ServerMessage),
    /// Heartbeat round trip; `None` when the last one went unanswered.
    Latency(Option<Duration>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetEvent {
    pub view: ViewId,
    pub link: LinkId,
    pub kind: NetEventKind,
}

/// Requests from the manager to a connection task.
#[derive(Debug)]
pub(crate) enum Control {
    Send(ClientMessage),
    Retarget(String),
    Close,
}

struct Link {
    id: LinkId,
    url: String,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    links: HashMap<ViewId, Link>,
    events: mpsc::UnboundedSender<NetEvent>,
    settings: NetworkConfig,
    next_link: LinkId,
}

impl ConnectionManager {
    pub fn new(settings: NetworkConfig, events: mpsc::UnboundedSender<NetEvent>) -> Self {
        Self {
            links: HashMap::new(),
            events,
            settings,
            next_link: 0,
        }
    }

    /// Start maintaining a connection for `view`. Opening an already open
    /// view with a different address retargets it.
    pub fn open(&mut self, view: ViewId, url: &str) {
        if self.links.contains_key(&view) {
            self.set_server(view, url);
            return;
        }

        self.next_link += 1;
        let id = self.next_link;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            view,
            id,
            url.to_string(),
            self.settings.clone(),
            self.events.clone(),
            control_rx,
        );
        info!(%view, url, "opening connection");
        let task = tokio::spawn(connection.run());
        self.links.insert(
            view,
            Link {
                id,
                url: url.to_string(),
                control: control_tx,
                task,
            },
        );
    }

    /// Stop the connection for `view`. It reports `Closed` once torn down.
    pub fn close(&mut self, view: ViewId) {
        if let Some(link) = self.links.remove(&view) {
            info!(%view, "closing connection");
            let _ = link.control.send(Control::Close);
        }
    }

    /// Queue `message` for `view`. Returns `false` when the view has no
    /// connection; messages sent before the handshake finishes are dropped.
    pub fn send(&self, view: ViewId, message: ClientMessage) -> bool {
        match self.links.get(&view) {
            Some(link) => link.control.send(Control::Send(message)).is_ok(),
            None => {
                debug!(%view, "no connection, dropping {:?}", message.opcode());
                false
            }
        }
    }

    /// Point `view` at a new address, reconnecting immediately.
    pub fn set_server(&mut self, view: ViewId, url: &str) {
        let Some(link) = self.links.get_mut(&view) else {
            debug!(%view, "no connection to retarget");
            return;
        };
        if link.url == url {
            return;
        }
        info!(%view, url, "retargeting connection");
        link.url = url.to_string();
        let _ = link.control.send(Control::Retarget(url.to_string()));
    }

    pub fn url(&self, view: ViewId) -> Option<&str> {
        self.links.get(&view).map(|link| link.url.as_str())
    }

    /// Whether `event` comes from the link currently serving its view.
    pub fn is_current(&self, event: &NetEvent) -> bool {
        self.links
            .get(&event.view)
            .is_some_and(|link| link.id == event.link)
    }

    /// Close every connection and wait for the tasks to finish.
    pub async fn shutdown(&mut self) {
        for (_, link) in self.links.drain() {
            let _ = link.control.send(Control::Close);
            let _ = link.task.await;
        }
    }
}
