//! # Slot Synchronization Client
//!
//! Client-side core that keeps a sparse, server-authoritative slot storage
//! (inventory, equipment, quick bar) consistent with an unreliable
//! request/response channel, while the presentation layer keeps reading and
//! mutating local state without waiting on the network.
//!
//! ## Architecture Overview
//!
//! ### Optimistic Application
//! Mutations are applied to the local store before the server answers, unless
//! the inventory runs with [`policy::SyncPolicy::WaitServerAck`]. Every issued
//! mutation gets a request id and a snapshot of the slots it touches.
//!
//! ### Correlation and Rollback
//! Responses are matched to their mutation by request id, never by slot, so a
//! two-slot exchange commits or rolls back as one unit. A rejected mutation
//! restores the snapshot; a confirmed one may carry authoritative values that
//! overwrite the local guess. Late and duplicate responses are ignored.
//!
//! ### Incremental Backfill
//! Containers are loaded in fixed-width windows with at most one window in
//! flight. Capacity is learned from the first response.
//!
//! ## Module Organization
//!
//! - `slot_store`: sparse slot map, capacity metadata, change notifications
//! - `events`: notification bus and subscriptions
//! - `pending`: pending operation tracker (pre-images, request ids)
//! - `batch_loader`: backfill windows and re-entrancy guard
//! - `policy`: synchronization policy and configuration
//! - `query`: filtered and paginated slot queries
//! - `transport`: outbound boundary trait and its channel implementation
//! - `inventory`: the model tying everything together
//! - `input`: console command parsing
//! - `network`: UDP client loop
//!
//! ## Usage Example
//!
//! ```rust
//! use client::inventory::SlotInventory;
//! use client::policy::SyncConfig;
//! use client::query::SlotFilter;
//! use shared::{ContainerKind, Request, Response};
//!
//! let mut inventory = SlotInventory::new(SyncConfig::default(), Vec::<Request>::new());
//! inventory.preload_all(ContainerKind::Inventory);
//!
//! // ...later, when the server answers the first window
//! inventory.handle_response(Response::Batch {
//!     container: ContainerKind::Inventory,
//!     start: 0,
//!     end: 100,
//!     max_size: Some(40),
//!     max_occupied_slot: None,
//!     records: Vec::new(),
//! });
//!
//! let all = inventory.filter(&SlotFilter::all(ContainerKind::Inventory));
//! assert_eq!(all.len(), 40);
//! assert!(inventory.is_fully_loaded(ContainerKind::Inventory));
//! ```

pub mod batch_loader;
pub mod events;
pub mod input;
pub mod inventory;
pub mod network;
pub mod pending;
pub mod policy;
pub mod query;
pub mod slot_store;
pub mod transport;
