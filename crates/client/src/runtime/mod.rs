// Runtime - the single task that owns the World
//
// One select loop drains collaborator commands and connection events and
// drives two timers: the input tick (prune, re-merge, send movement) and
// the render tick (cameras, interpolation, publish a Frame). Frames go out
// through a watch channel, so readers only ever see fully merged state.
use std::sync::Arc;
use std::time::Duration;

use protocol::packets::ClientMessage;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::game::{ViewId, World};
use crate::input::{ClientHandle, Command};
use crate::network::{ConnectionManager, NetEvent};
use crate::render::Frame;
use crate::utils::Clock;

pub struct Runtime {
    config: Config,
    world: World,
    manager: ConnectionManager,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<NetEvent>,
    frames: watch::Sender<Arc<Frame>>,
    clock: Clock,
    last_render: f64,
}

impl Runtime {
    /// Build a runtime and the handle that drives it. Nothing runs until
    /// `run` is awaited, typically via `tokio::spawn`.
    pub fn new(config: Config) -> (Self, ClientHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (frames, frame_rx) = watch::channel(Arc::new(Frame::default()));

        let runtime = Self {
            world: World::new(&config),
            manager: ConnectionManager::new(config.network.clone(), event_tx),
            config,
            commands,
            events,
            frames,
            clock: Clock::new(),
            last_render: 0.0,
        };
        (runtime, ClientHandle::new(command_tx, frame_rx))
    }

    pub async fn run(mut self) -> Result<(), ClientError> {
        let mut input_tick =
            tokio::time::interval(Duration::from_millis(self.config.network.input_tick_ms.max(1)));
        input_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut render_tick =
            tokio::time::interval(Duration::from_millis(self.config.render.render_tick_ms.max(1)));
        render_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("client runtime started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command),
                },
                Some(event) = self.events.recv() => self.on_event(event),
                _ = input_tick.tick() => self.input_tick(),
                _ = render_tick.tick() => self.render_tick(),
            }
        }

        info!("client runtime shutting down");
        self.manager.shutdown().await;
        Ok(())
    }

    fn apply(&mut self, command: Command) {
        let now = self.clock.now();
        match command {
            Command::CreateView(view) => {
                self.world.create_view(view);
            }
            Command::Connect { view, url } => {
                let url = url.or_else(|| self.config.servers.url(view).map(str::to_string));
                let Some(url) = url else {
                    warn!(%view, "no server configured, not connecting");
                    return;
                };
                self.world.create_view(view);
                self.manager.open(view, &url);
            }
            Command::Disconnect(view) => {
                self.manager.close(view);
                self.world.close_view(view, now);
            }
            Command::SetServer { view, url } => self.manager.set_server(view, &url),
            Command::Spawn { view, name } => self.send(view, ClientMessage::Spawn { name }),
            Command::Move { view, target } => self.world.set_target(view, target),
            Command::Split(view) => self.send(view, ClientMessage::Split),
            Command::Eject(view) => self.send(view, ClientMessage::Eject),
            Command::FeedToggle(view) => self.send(view, ClientMessage::FeedToggle),
            Command::Chat { view, text } => self.send(view, ClientMessage::Chat { text }),
            Command::Zoom(factor) => self.world.zoom(factor),
            Command::Shutdown => {}
        }
    }

    fn send(&self, view: ViewId, message: ClientMessage) {
        if !self.manager.send(view, message) {
            debug!(%view, "not connected, command ignored");
        }
    }

    fn on_event(&mut self, event: NetEvent) {
        if !self.manager.is_current(&event) {
            trace!(view = %event.view, link = event.link, "stale connection event");
            return;
        }
        let now = self.clock.now();
        self.world.handle_event(event.view, event.kind, now);
    }

    fn input_tick(&mut self) {
        let now = self.clock.now();
        self.world.prune(now);
        for view in self.world.views() {
            if !view.is_active() {
                continue;
            }
            if let Some(target) = view.target {
                self.manager.send(
                    view.id,
                    ClientMessage::Move {
                        x: target.x as i32,
                        y: target.y as i32,
                    },
                );
            }
        }
    }

    fn render_tick(&mut self) {
        let now = self.clock.now();
        let dt = ((now - self.last_render).max(0.0) / 1000.0) as f32;
        self.last_render = now;
        let frame = self.world.frame(now, dt);
        self.frames.send_replace(Arc::new(frame));
    }
}
