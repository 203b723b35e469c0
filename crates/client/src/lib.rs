//! Multi-view world synchronization engine for cellsync.
//!
//! Up to three connections (primary, secondary, spectate) observe the same
//! game world. Each view keeps its own copy of every entity it sees; the
//! merge engine reconciles those copies into one render-facing entity per
//! id, and every render tick publishes an interpolated [`Frame`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), client::ClientError> {
//! let config = client::Config::load("cellsync.toml")?;
//! let (runtime, handle) = client::Runtime::new(config);
//! tokio::spawn(runtime.run());
//! handle.connect(client::ViewId::Primary)?;
//! handle.spawn(client::ViewId::Primary, "cell")?;
//! # Ok(())
//! # }
//! ```

pub mod camera; // Per-view camera targets and blending
pub mod config; // TOML configuration
mod error;
pub mod game; // Entity store, merge engine, World
pub mod input; // Commands and the client handle
pub mod network; // Connection manager and per-view connection tasks
pub mod render; // Interpolation and frame snapshots
pub mod runtime; // The task that owns the World
pub mod utils; // Easing and clock helpers

pub use config::Config;
pub use error::ClientError;
pub use game::{MergeStrategy, ViewId, World};
pub use input::{ClientHandle, Command};
pub use network::ConnectionState;
pub use render::Frame;
pub use runtime::Runtime;
