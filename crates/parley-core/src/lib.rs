pub mod auth;
pub mod error;
pub mod events;
pub mod file_share;
pub mod identity;
pub mod message;
pub mod plan;
pub mod presence;
pub mod profile;
pub mod room;

use dashmap::DashMap;
use parley_db::DbPool;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Worker id baked into every snowflake minted by this process.
pub const SNOWFLAKE_WORKER_ID: u16 = 1;

pub fn next_id() -> i64 {
    parley_util::snowflake::generate(SNOWFLAKE_WORKER_ID)
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    /// Base URL used to build profile links, without a trailing slash.
    pub public_url: String,
    /// A disconnected holder's name may be reclaimed after this long.
    pub stale_after_minutes: i64,
    /// Bound on the identity retry performed at join time.
    pub identity_timeout_secs: u64,
    pub max_message_chars: usize,
    /// Participant caps per owner plan. 0 = unlimited.
    pub default_max_participants: u32,
    pub pro_max_participants: u32,
    pub default_expiry_hours: u32,
    pub max_expiry_hours: u32,
    pub max_content_bytes: usize,
    pub max_messages_per_minute: u32,
    pub max_typing_per_minute: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            jwt_expiry_seconds: 604_800,
            public_url: "http://localhost:8080".to_string(),
            stale_after_minutes: 30,
            identity_timeout_secs: 5,
            max_message_chars: 10_000,
            default_max_participants: 0,
            pro_max_participants: 0,
            default_expiry_hours: 24,
            max_expiry_hours: 720,
            max_content_bytes: 1_048_576,
            max_messages_per_minute: 60,
            max_typing_per_minute: 120,
        }
    }
}

/// One async lock per room, serializing the reconcile-and-insert step of joins.
#[derive(Default)]
pub struct RoomLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl RoomLocks {
    pub async fn lock(&self, room_id: i64) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(room_id).or_default().clone();
        lock.lock_owned().await
    }
}

/// Cache key for the owner plan of a room.
pub type PlanCache = moka::future::Cache<i64, Option<String>>;

/// Build the plan cache with a 60-second TTL and 10k max entries.
pub fn build_plan_cache() -> PlanCache {
    moka::future::Cache::builder()
        .max_capacity(10_000)
        .time_to_live(std::time::Duration::from_secs(60))
        .build()
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub event_bus: events::EventBus,
    pub config: AppConfig,
    /// Live connection -> room binding index.
    pub presence: Arc<presence::PresenceRegistry>,
    pub room_locks: Arc<RoomLocks>,
    pub plan_cache: PlanCache,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            event_bus: events::EventBus::default(),
            config,
            presence: Arc::new(presence::PresenceRegistry::new()),
            room_locks: Arc::new(RoomLocks::default()),
            plan_cache: build_plan_cache(),
        }
    }
}
