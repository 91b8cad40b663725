//! Host-supplied reaction to losing a member.
//!
//! Some hosts treat the whole session as forfeit the moment anyone drops
//! (a standalone game build quits), others must keep running (an editor or
//! a test harness). The coordinator only reports the loss; what happens
//! next belongs to the host.

use roster_protocol::ConnectionId;

/// Invoked by the coordinator for every leave broadcast, before the player
/// is removed from the local view. This includes ids the local view never
/// held (a player that left before this participant's snapshot arrived),
/// so implementations must not assume `connection_id` was ever a member.
///
/// Any `Fn(ConnectionId)` closure is a policy:
///
/// ```rust
/// use std::sync::Arc;
/// use roster_membership::TerminationPolicy;
/// use roster_protocol::ConnectionId;
///
/// let policy: Arc<dyn TerminationPolicy> = Arc::new(|id: ConnectionId| {
///     eprintln!("member {id} lost, shutting down");
/// });
/// policy.on_member_lost(ConnectionId::new(1));
/// ```
pub trait TerminationPolicy: Send + Sync + 'static {
    /// A member left the session.
    fn on_member_lost(&self, connection_id: ConnectionId);
}

/// The default policy: losing a member never ends the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepRunning;

impl TerminationPolicy for KeepRunning {
    fn on_member_lost(&self, connection_id: ConnectionId) {
        tracing::debug!(%connection_id, "member lost, keeping session alive");
    }
}

impl<F> TerminationPolicy for F
where
    F: Fn(ConnectionId) + Send + Sync + 'static,
{
    fn on_member_lost(&self, connection_id: ConnectionId) {
        self(connection_id);
    }
}
