//! Membership replication for Roster.
//!
//! Keeps "who is connected, and what describes each of them" consistent
//! between one authoritative server and any number of clients.
//!
//! # Key types
//!
//! - [`MembershipCoordinator`]: runs the join/leave protocol for one process
//! - [`ServerRegistry`]: the server's canonical `id → encoded record` map
//! - [`ClientView`]: every process's derived `id → record` map
//! - [`MembershipEvent`]: `PlayerAdded` / `PlayerRemoved` notifications
//! - [`TerminationPolicy`]: what the host does when a member is lost
//! - [`InstanceSlot`]: at most one live coordinator per slot
//!
//! # How it fits in the stack
//!
//! ```text
//! Runtime (above)  ← owns the coordinator, moves its messages over the network
//!     ↕
//! Membership (this crate)  ← registries, views, protocol state machine
//!     ↕
//! Protocol (below)  ← PlayerRecord, MembershipMessage, Codec
//! ```
//!
//! The coordinator never performs I/O. Every handler returns the
//! [`Outbound`] messages the caller must deliver, which keeps the protocol
//! testable without a network.

mod coordinator;
mod error;
mod events;
mod policy;
mod registry;
mod slot;
mod view;

pub use coordinator::{
    Destination, JoinPhase, JoinReport, MembershipCoordinator, Outbound, Role,
};
pub use error::MembershipError;
pub use events::{ListenerId, MembershipEvent};
pub use policy::{KeepRunning, TerminationPolicy};
pub use registry::ServerRegistry;
pub use slot::{InstanceGuard, InstanceSlot};
pub use view::ClientView;
