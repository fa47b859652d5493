//! Protocol constants and tuning parameters.
//!
//! All timeouts, buffer sizes, protocol magic values and tuning knobs used
//! throughout the client live here.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &str = "-RT0001-";

/// Default BitTorrent listen port advertised to trackers
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Block and piece sizes
// ============================================================================

/// Standard block size (16KB)
pub const BLOCK_SIZE: u32 = 1 << 14;

/// Upper bound on memory held in piece buffers at once (512MB); the
/// scheduler derives its active-piece cap from this
pub const MAX_MEMPOOL_SIZE: usize = 1 << 29;

// ============================================================================
// Peer connection limits
// ============================================================================

/// Maximum outstanding block requests per peer
pub const MAX_BLOCKS_IN_FLIGHT: usize = 10;

/// Maximum block requests sent in one batch
pub const MAX_BLOCKS_PER_REQUEST: usize = 5;

/// Connection attempts per peer before giving up on it
pub const MAX_RETRIES: u32 = 3;

// ============================================================================
// Timeouts - peer wire
// ============================================================================

/// TCP connection timeout
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Handshake send/receive timeout after TCP connect
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for sending a wire message
pub const SEND_MSG_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for receiving a wire message
pub const RECEIVE_MSG_TIMEOUT: Duration = Duration::from_secs(20);

/// Age after which an unanswered block request may be re-offered
pub const BLOCK_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Intervals
// ============================================================================

/// Pause between request batches on a peer connection
pub const REQUEST_INTERVAL: Duration = Duration::from_millis(100);

/// How often the peer manager sweeps dead and timed-out connections
pub const PEER_CLEANUP_INTERVAL: Duration = Duration::from_secs(10);

/// How often completion is polled while waiting on the swarm
pub const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Announce interval used until a tracker supplies one
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1800);

// ============================================================================
// Reconnection backoff
// ============================================================================

/// Shortest randomized delay before the first reconnect attempt
pub const RECONNECT_DELAY_MIN: Duration = Duration::from_secs(1);

/// Longest randomized delay before the first reconnect attempt; doubles
/// on each further attempt
pub const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(5);

// ============================================================================
// Tracker protocol
// ============================================================================

/// HTTP tracker request timeout
pub const HTTP_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Overall deadline for a UDP connect + announce exchange
pub const UDP_TRACKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Number of peers requested from UDP trackers
pub const TRACKER_NUM_WANT: u32 = 100;

/// UDP tracker protocol ID (magic number)
pub const UDP_TRACKER_PROTOCOL_ID: u64 = 0x41727101980;

/// UDP tracker connect action
pub const UDP_ACTION_CONNECT: u32 = 0;

/// UDP tracker announce action
pub const UDP_ACTION_ANNOUNCE: u32 = 1;

/// UDP tracker error action
pub const UDP_ACTION_ERROR: u32 = 3;

// ============================================================================
// Wire protocol
// ============================================================================

/// BitTorrent protocol string
pub const PROTOCOL_STRING: &[u8] = b"BitTorrent protocol";

/// Length of the handshake message in bytes
pub const HANDSHAKE_LEN: usize = 68;

/// Largest wire message accepted from a peer (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
