//! # Slot Server Library
//!
//! Reference authoritative server for the slot synchronization protocol. It
//! owns the real contents of every connected client's containers, answers
//! backfill windows, and validates mutations so that clients can exercise
//! confirmation, correction and rollback against a live peer.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Storage
//! Each client gets its own inventory, equipment and quick bar, seeded with
//! random items on connect. The client's view is only ever a cache of this.
//!
//! ### Request Handling
//! - `LoadRange` is answered with the window's occupied slots plus the
//!   container capacity and its highest occupied index
//! - `Mutate` is validated (bounds, equipment rules, optional random
//!   rejection) and answered with the authoritative contents of every touched
//!   slot, or not at all on success when running in silent-success mode
//!
//! ### Client Management
//! Connection tracking by address, capacity limit, and inactivity timeout.
//!
//! ## Architecture Design
//!
//! A single main loop owns all mutable server state and processes events one
//! at a time. Background tasks only move datagrams between the socket and the
//! main loop, and watch for timed-out clients.
//!
//! ## Module Organization
//!
//! - `authority`: per-client storage, request validation and answers
//! - `client_manager`: connection lifecycle and timeouts
//! - `network`: UDP tasks and main loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::authority::AuthorityConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new("127.0.0.1:8080", 32, AuthorityConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod client_manager;
pub mod network;
