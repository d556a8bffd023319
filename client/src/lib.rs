//! # Puzzle Sync Client Library
//!
//! Client-side half of the collaborative puzzle grid. It keeps a local copy of
//! one room's grid, applies the user's edits to it immediately, and keeps that
//! copy converged with the server's action log over a WebSocket that survives
//! disconnects.
//!
//! ## Architecture Overview
//!
//! ### Optimistic Application
//! Edits coming from the UI are stamped with the client's private identity,
//! applied to the local grid without waiting for the server and appended to a
//! pending queue. The user never waits on the network to see their own input.
//!
//! ### Echo Reconciliation
//! The server broadcasts every logged action to every member of the room,
//! including its author. When the head of the pending queue comes back it is
//! simply retired; anything else is applied and the remaining pending actions
//! are replayed on top of it.
//!
//! ### Reconnect and Resend
//! A dropped connection is retried with full-jitter exponential backoff. On
//! every successful connect the client rejoins from the last sequence number
//! it saw and resends its pending queue in order.
//!
//! ## Module Organization
//!
//! ### Synchronizer (`sync`)
//! Pending queue, sequence bookkeeping, identity stamping and the desync
//! check. Generic over [`transport::Channel`] so it can be driven without a
//! socket.
//!
//! ### Transport (`transport`)
//! Connection state machine over `tokio-tungstenite`: connecting, connected,
//! reconnecting and disconnected, with an abortable reconnect timer.
//!
//! ### Backoff (`backoff`)
//! Bounded attempt counter and jittered delay computation.
//!
//! ### Session (`session`)
//! The event loop joining transport events and UI commands.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::backoff::BackoffConfig;
//! use client::session::{Command, Session};
//! use client::sync::Synchronizer;
//! use client::transport::Transport;
//! use shared::{Action, Identity, MarchingBands};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Transport::new("ws://127.0.0.1:8080", BackoffConfig::default());
//!     let sync = Synchronizer::new(
//!         "sunday",
//!         &MarchingBands::new(13),
//!         Identity::generate(),
//!         transport,
//!     );
//!
//!     let (commands, commands_rx) = mpsc::unbounded_channel();
//!     commands.send(Command::Submit(Action::set_cell(0, 0, "A")))?;
//!     commands.send(Command::Leave)?;
//!
//!     Session::new(sync).run(commands_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod session;
pub mod sync;
pub mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use session::{Command, Session, SessionUpdate};
pub use sync::{MessageOutcome, SyncError, Synchronizer};
pub use transport::{Channel, ChannelState, Transport, TransportEvent};
