//! Protocol-level invariant constants. Bit-exact values matter for interop
//! with any other implementation of this wire format.

use std::time::Duration;

/// The only version string the decoder accepts.
pub const PROTOCOL_VERSION: &str = "0.2";

/// Soft cap, in bytes, on a single broadcast datagram.
pub const BROADCAST_CAPACITY: usize = 512;

/// Starting score for a freshly published advert.
pub const MAX_SCORE: f64 = 10_000.0;

/// Connect + drain timeout for unicast TCP sends.
pub const TCP_TIMEOUT: Duration = Duration::from_secs(2);

/// Total read timeout for an inbound TCP stream.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline extension applied when a unicast item is requeued without an
/// available route, or by a non-main node after a failed forward.
pub const DEADLINE_EXT: Duration = Duration::from_secs(10);
