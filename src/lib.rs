//! # live-poll
//!
//! Real-time polling with one coordinator per session.
//!
//! Every poll session is owned by a single coordinator task. All commands
//! for a session (create, view, vote, close, export, subscribe, expire)
//! go through that coordinator's mailbox, so they take effect one at a time
//! in arrival order. Subscribers receive the session's state on connect and
//! then every tally update and the close notice in the order they happened.
//! Sessions are wiped a fixed time after creation.
//!
//! ## Features
//!
//! - **Single-writer sessions**: no locks around tallies or voter ledgers
//! - **Live updates**: `init` / `update` / `closed` events per session
//! - **Pluggable storage**: in-memory or one JSON file per session
//! - **HTTP/WebSocket adapter**: axum routes over the same coordinators
//!
//! ## Quick Start
//!
//! ```no_run
//! use live_poll::{NewSession, SessionRegistry, VoteMode};
//!
//! #[tokio::main]
//! async fn main() -> live_poll::Result<()> {
//!     live_poll::logging::try_init().ok();
//!
//!     let registry = SessionRegistry::in_memory();
//!     let session = registry
//!         .create(NewSession::new("Lunch?", VoteMode::Single, ["Ramen", "Curry"]))
//!         .await?;
//!
//!     let handle = registry.coordinator(session.id)?;
//!     let mut updates = handle.subscribe().await?;
//!     handle.submit_vote(vec!["1".into()], "voter-a").await?;
//!
//!     while let Some(event) = updates.recv().await {
//!         println!("{}", event.event_name());
//!     }
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod broadcast;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use broadcast::{BroadcastMessage, Broadcaster, Subscription};
pub use config::{Config, ConfigError};
pub use error::{PollError, Result};
pub use session::{
    ClosedNotice, CoordinatorConfig, CoordinatorHandle, NewSession, PollOption, Session,
    SessionId, SessionRegistry, SessionStatus, SessionView, VoteAck, VoteMode,
};
pub use storage::{FileStorage, MemoryStorage, SessionStorage};
