use parley_core::events::{ConnectionId, ServerEvent};
use parley_core::file_share::AccessContext;
use parley_core::identity::Identity;
use parley_core::room::RoomBinding;
use tokio::task::JoinHandle;

/// Per-connection state, owned by the connection task.
pub struct ConnectionSession {
    pub connection_id: ConnectionId,
    /// Bearer credential presented on upgrade, if any.
    pub credential: Option<String>,
    /// Cached once resolved; never re-resolved after success.
    pub identity: Option<Identity>,
    /// Connect-time resolution still in flight.
    pub pending_identity: Option<JoinHandle<Option<Identity>>>,
    pub binding: Option<RoomBinding>,
    /// Room-wide events published before the current binding was made are dropped.
    pub room_events_from: u64,
    pub access: AccessContext,
}

impl ConnectionSession {
    pub fn new(credential: Option<String>, access: AccessContext) -> Self {
        Self {
            connection_id: ConnectionId::next(),
            credential,
            identity: None,
            pending_identity: None,
            binding: None,
            room_events_from: 0,
            access,
        }
    }

    pub fn room_id(&self) -> Option<i64> {
        self.binding.as_ref().map(|b| b.room_id)
    }

    pub fn should_receive_event(&self, event: &ServerEvent) -> bool {
        if !event.is_for(self.connection_id, self.room_id()) {
            return false;
        }
        !event.is_room_wide() || event.seq >= self.room_events_from
    }

    /// Bind to a room. Switching rooms moves the event floor up to `events_from`.
    pub fn bind(&mut self, binding: RoomBinding, events_from: u64) {
        if self.room_id() != Some(binding.room_id) {
            self.room_events_from = events_from;
        }
        self.binding = Some(binding);
    }

    pub fn needs_identity(&self) -> bool {
        self.identity.is_none() && self.credential.is_some()
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if let Some(task) = self.pending_identity.take() {
            task.abort();
        }
    }
}
