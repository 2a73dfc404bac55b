//! Bit-exact constants from the protocol specification.

use std::time::Duration;

/// Record delimiter. Payloads must not contain this byte.
pub const ETX: u8 = 0x03;

/// Size of one bounded read performed by the framer when no complete
/// record is buffered.
pub const BUFFER_SIZE: usize = 256;

/// Consecutive ports tried when binding the listener.
pub const MAX_ATTEMPTS: u16 = 5;

/// `accept()` timeout for the admission listener.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(5);

/// Listen backlog.
pub const BACKLOG: u32 = 10;

/// Maximum concurrent online users sharing one source IP.
pub const MAX_PER_IP: usize = 25;

/// Matchmaker tick interval.
pub const LINK_INTERVAL: Duration = Duration::from_secs(10);

/// Persistence replace-all interval.
pub const DB_UPDATE_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-record handshake deadline.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(900);

/// Relay loop cycle floor.
pub const RELAY_CYCLE_FLOOR: Duration = Duration::from_millis(50);

/// Initial rating assigned to a brand-new user.
pub const INITIAL_RATING: i64 = 1000;

/// Initial Elo K-factor.
pub const INITIAL_ELO_WEIGHT: i64 = 40;

/// Amount the Elo K-factor decreases after each rated game.
pub const ELO_WEIGHT_DECREMENT: i64 = 2;

/// Floor below which the Elo K-factor never drops.
pub const ELO_WEIGHT_FLOOR: i64 = 12;

/// Password sentinel: the next presented password replaces this one.
pub const PASSWORD_RESET_SENTINEL: &str = "%RESET_PASSWORD";

/// Reported in the admin welcome banner.
pub const PROGRAM_VERSION: &str = "V1.04";
