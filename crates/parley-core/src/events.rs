use parley_models::protocol::GatewayEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of one gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Every connection bound to the room.
    Room(i64),
    /// Every connection bound to the room except one.
    RoomExcept {
        room_id: i64,
        connection_id: ConnectionId,
    },
    Connection(ConnectionId),
}

#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Publish order on the bus, assigned by [`EventBus`].
    pub seq: u64,
    pub audience: Audience,
    pub event: Arc<GatewayEvent>,
}

impl ServerEvent {
    /// Whether a connection bound to `room_id` (if any) should receive this event.
    pub fn is_for(&self, connection_id: ConnectionId, room_id: Option<i64>) -> bool {
        match self.audience {
            Audience::Room(target) => room_id == Some(target),
            Audience::RoomExcept {
                room_id: target,
                connection_id: excluded,
            } => room_id == Some(target) && connection_id != excluded,
            Audience::Connection(target) => connection_id == target,
        }
    }

    pub fn is_room_wide(&self) -> bool {
        !matches!(self.audience, Audience::Connection(_))
    }
}

/// Broadcast-based event bus for real-time dispatch.
///
/// Single process only: every connection subscribes to the same channel and
/// filters by [`Audience`].
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ServerEvent>,
    next_seq: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn publish(&self, audience: Audience, event: GatewayEvent) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        // Ignore error if no receivers
        let _ = self.sender.send(ServerEvent {
            seq,
            audience,
            event: Arc::new(event),
        });
    }

    /// Sequence number the next published event will carry.
    pub fn cursor(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    pub fn to_room(&self, room_id: i64, event: GatewayEvent) {
        self.publish(Audience::Room(room_id), event);
    }

    pub fn to_room_except(&self, room_id: i64, connection_id: ConnectionId, event: GatewayEvent) {
        self.publish(
            Audience::RoomExcept {
                room_id,
                connection_id,
            },
            event,
        );
    }

    pub fn to_connection(&self, connection_id: ConnectionId, event: GatewayEvent) {
        self.publish(Audience::Connection(connection_id), event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_filtering() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        let event = Arc::new(GatewayEvent::error("x"));

        let room = ServerEvent {
            seq: 0,
            audience: Audience::Room(7),
            event: event.clone(),
        };
        assert!(room.is_for(a, Some(7)));
        assert!(!room.is_for(a, Some(8)));
        assert!(!room.is_for(a, None));

        let except = ServerEvent {
            seq: 1,
            audience: Audience::RoomExcept {
                room_id: 7,
                connection_id: a,
            },
            event: event.clone(),
        };
        assert!(!except.is_for(a, Some(7)));
        assert!(except.is_for(b, Some(7)));

        let direct = ServerEvent {
            seq: 2,
            audience: Audience::Connection(b),
            event,
        };
        assert!(direct.is_for(b, None));
        assert!(!direct.is_for(a, Some(7)));
        assert!(room.is_room_wide() && except.is_room_wide());
        assert!(!direct.is_room_wide());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(8);
        bus.to_room(1, GatewayEvent::error("nobody listening"));
        let mut rx = bus.subscribe();
        bus.to_room(1, GatewayEvent::error("heard"));
        let got = rx.recv().await.expect("event");
        assert_eq!(*got.event, GatewayEvent::error("heard"));
    }

    #[tokio::test]
    async fn events_carry_increasing_sequence_numbers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let start = bus.cursor();
        bus.to_room(1, GatewayEvent::error("first"));
        bus.to_connection(ConnectionId::next(), GatewayEvent::error("second"));
        assert_eq!(rx.recv().await.expect("first").seq, start);
        assert_eq!(rx.recv().await.expect("second").seq, start + 1);
        assert_eq!(bus.cursor(), start + 2);
    }
}
