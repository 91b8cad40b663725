//! # Roster
//!
//! Server-authoritative player membership for networked games.
//!
//! One process runs a [`RosterServer`]; any number of others connect with
//! a [`RosterClient`]. Every process ends up with the same view of who is
//! connected and the [`PlayerRecord`] each of them published, and is told
//! about changes through [`MembershipEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roster::prelude::*;
//!
//! # async fn demo() -> Result<(), RosterError> {
//! let builder = RosterServer::builder()
//!     .bind("127.0.0.1:7777")
//!     .local_record(PlayerRecord::new("Host"));
//! let mut events = builder.subscribe();
//! let server = builder.build().await?;
//! tokio::spawn(server.run());
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod events;
mod handler;
mod node;
mod server;

pub use client::{RosterClient, RosterClientBuilder};
pub use error::RosterError;
pub use events::EventStream;
pub use node::MembershipHandle;
pub use server::{
    DEFAULT_BIND_ADDR, DEFAULT_CHANNEL_SIZE, RosterServer, RosterServerBuilder,
};

/// Everything a host application usually needs.
pub mod prelude {
    pub use crate::{
        EventStream, MembershipHandle, RosterClient, RosterClientBuilder, RosterError,
        RosterServer, RosterServerBuilder,
    };
    pub use roster_membership::{
        InstanceSlot, KeepRunning, MembershipError, MembershipEvent,
        TerminationPolicy,
    };
    pub use roster_protocol::{
        Codec, ConnectionId, JsonCodec, PlayerRecord,
    };
}
