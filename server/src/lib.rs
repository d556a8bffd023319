//! # Puzzle Sync Server Library
//!
//! This library provides the authoritative server for collaborative puzzle
//! solving. It owns one append-only action log per room, assigns every edit
//! its definitive sequence number, and fans confirmed edits out to everyone in
//! the room so their grids converge.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Ordering
//! The order in which the server appends an edit to a room's log is the order
//! every client applies it in. Sequence numbers are never taken from clients.
//!
//! ### Room Membership
//! Handles the lifecycle of connections within rooms:
//! - Joining, with the backlog streamed from the client's last seen sequence
//! - Presence of the other members (who is here and where their cursor is)
//! - Leaving, explicitly or by dropping the connection
//! - Moving a connection from one room to another
//!
//! ### Identity Protection
//! Clients stamp their private id on every frame. The server validates it and
//! derives the public id from it; only the public id is stored or sent on.
//!
//! ## Architecture Design
//!
//! ### Single-Threaded Routing Loop
//! Connection tasks forward decoded text frames over an unbounded channel to
//! one loop that owns the registry. Frames are therefore handled one at a
//! time in arrival order, and no lock guards the grids or the membership
//! tables.
//!
//! ### Sans-IO Registry
//! The room registry returns the deliveries each frame causes instead of
//! writing to sockets, so all routing rules are tested without a network.
//!
//! ## Module Organization
//!
//! ### Store Module (`store`)
//! The key-value/list collaborator the log is built on, with an in-memory
//! implementation that can snapshot itself to a file.
//!
//! ### Action Log Module (`action_log`)
//! Per-room append and suffix reads, plus small per-room metadata.
//!
//! ### Registry Module (`registry`)
//! Membership, validation, log appends and fan-out.
//!
//! ### Network Module (`network`)
//! WebSocket accept loop, connection tasks and the routing loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::store::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Rooms created by this server get a 13x13 grid
//!     let server = Server::bind("127.0.0.1:8080", MemoryStore::new(), 13).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod action_log;
pub mod error;
pub mod network;
pub mod registry;
pub mod store;

pub use error::ServerError;
pub use network::{Server, ServerConfig, ServerHandle};
