//! Networking constants (spec.md §5, §4.7, §4.8, §4.9).
//!
//! Values spec.md pins exactly are named literally; values it leaves to the
//! implementation (e.g. the heartbeat cadence) carry a comment saying so.

use std::time::Duration;

/// Magic bytes identifying the main-net wire protocol (spec.md §6),
/// little-endian `0x746e6470`.
pub const MAIN_NET_MAGIC: u32 = 0x746e_6470;

/// Default peer listen port (spec.md §6).
pub const DEFAULT_PORT: u16 = 9567;

/// Protocol version this node speaks (spec.md §6).
pub const PROTOCOL_VERSION: u32 = 1;

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(100);
pub const PING_TIMEOUT: Duration = Duration::from_secs(1);
pub const PONG_TIMEOUT: Duration = Duration::from_secs(60);
pub const READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Not pinned by spec.md beyond "idle > HEARTBEAT"; ninety seconds keeps
/// well clear of `PONG_TIMEOUT` while still detecting a silent peer
/// reasonably quickly.
pub const HEARTBEAT: Duration = Duration::from_secs(90);

pub const MIN_INITIAL_PEERS: usize = 1;
pub const MAX_PEERS: usize = 125;
pub const NEW_PEERS_INTERVAL: Duration = Duration::from_secs(60);
pub const CLEAN_INTERVAL: Duration = Duration::from_secs(600);

/// 24 hour address ban duration (spec.md §4.7, §GLOSSARY).
pub const BAN_DURATION_SECS: u32 = 24 * 60 * 60;
pub const BAN_SCORE_THRESHOLD: i32 = 100;

/// How many consecutive syncing-peer selection failures IBD tolerates
/// before reporting failure (spec.md §4.9 step 7).
pub const SYNC_ATTEMPTS: u32 = 5;

/// Height gap that triggers entry into IBD (spec.md §4.9): not pinned to a
/// literal value, a day's worth of blocks at `TARGET_SPACING` is a
/// conservative trigger that avoids flapping in and out of IBD near the
/// tip.
pub const IBD_HEIGHT_THRESHOLD: u64 = 720;

/// Bound on how many candidate addresses the dial loop considers per tick
/// (spec.md §4.8: "up to 5·MAX_PEERS").
pub fn dial_candidate_budget(max_peers: usize) -> usize {
    5 * max_peers
}

/// Maximum items an `Inventory` message may carry (spec.md §4.6).
pub const MAX_INVENTORY_ITEMS: usize = 500;
/// Maximum headers a `Headers` message may carry (spec.md §4.6).
pub const MAX_HEADERS: usize = 2000;

/// How long an address book entry may go unseen before `cleanUp()` drops it
/// (spec.md "Lifecycle summary"); not pinned to a literal, thirty days
/// matches the retention window Bitcoin-derived address managers use.
pub const ADDRESS_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
