// Collaborator-facing commands and the handle that sends them
use std::sync::Arc;

use glam::Vec2;
use tokio::sync::{mpsc, watch};

use crate::error::ClientError;
use crate::game::ViewId;
use crate::render::Frame;

/// Requests processed by the runtime, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateView(ViewId),
    /// Open `view`, using the configured address when `url` is `None`.
    Connect { view: ViewId, url: Option<String> },
    Disconnect(ViewId),
    SetServer { view: ViewId, url: String },
    Spawn { view: ViewId, name: String },
    /// World-space movement target, resent on every input tick.
    Move { view: ViewId, target: Vec2 },
    Split(ViewId),
    Eject(ViewId),
    FeedToggle(ViewId),
    Chat { view: ViewId, text: String },
    /// Multiply the manual zoom factor (mouse wheel).
    Zoom(f32),
    Shutdown,
}

/// Cloneable handle to a running client.
///
/// Commands are fire-and-forget; effects show up in later frames. Every
/// method fails only once the runtime has stopped.
#[derive(Clone)]
pub struct ClientHandle {
    commands: mpsc::UnboundedSender<Command>,
    frames: watch::Receiver<Arc<Frame>>,
}

impl ClientHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        frames: watch::Receiver<Arc<Frame>>,
    ) -> Self {
        Self { commands, frames }
    }

    pub fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::RuntimeClosed)
    }

    pub fn create_view(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::CreateView(view))
    }

    /// Connect `view` to its configured server.
    pub fn connect(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::Connect { view, url: None })
    }

    pub fn connect_to(&self, view: ViewId, url: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::Connect {
            view,
            url: Some(url.into()),
        })
    }

    pub fn disconnect(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::Disconnect(view))
    }

    pub fn set_server(&self, view: ViewId, url: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::SetServer {
            view,
            url: url.into(),
        })
    }

    pub fn spawn(&self, view: ViewId, name: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::Spawn {
            view,
            name: name.into(),
        })
    }

    pub fn move_to(&self, view: ViewId, x: f32, y: f32) -> Result<(), ClientError> {
        self.send(Command::Move {
            view,
            target: Vec2::new(x, y),
        })
    }

    pub fn split(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::Split(view))
    }

    pub fn eject(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::Eject(view))
    }

    pub fn feed_toggle(&self, view: ViewId) -> Result<(), ClientError> {
        self.send(Command::FeedToggle(view))
    }

    pub fn chat(&self, view: ViewId, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::Chat {
            view,
            text: text.into(),
        })
    }

    pub fn zoom(&self, factor: f32) -> Result<(), ClientError> {
        self.send(Command::Zoom(factor))
    }

    pub fn shutdown(&self) -> Result<(), ClientError> {
        self.send(Command::Shutdown)
    }

    /// Latest published frame.
    pub fn frame(&self) -> Arc<Frame> {
        Arc::clone(&self.frames.borrow())
    }

    pub fn score(&self, view: ViewId) -> u32 {
        self.frames.borrow().score(view)
    }

    pub fn alive(&self) -> bool {
        self.frames.borrow().alive()
    }

    /// Wait for the next frame.
    pub async fn next_frame(&mut self) -> Result<Arc<Frame>, ClientError> {
        self.frames
            .changed()
            .await
            .map_err(|_| ClientError::RuntimeClosed)?;
        Ok(Arc::clone(&self.frames.borrow_and_update()))
    }

    /// Independent frame receiver, e.g. for a render thread.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Frame>> {
        self.frames.clone()
    }
}
