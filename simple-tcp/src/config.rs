//! Tunable endpoint parameters.
//!
//! Every bounded wait in the protocol takes its limit from here.  By
//! default a handshake step waits 2 seconds and the initial sequence number
//! is drawn from `1000..9999`.

use std::ops::Range;
use std::time::Duration;

/// How long a handshake step waits for the peer by default.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Largest UDP payload; also the default receive buffer size.
pub const MAX_DATAGRAM: usize = 65_535;

/// Receive buffer size used unless configured otherwise.
pub const DEFAULT_MAX_DATAGRAM: usize = MAX_DATAGRAM;

/// Range the initial sequence number is drawn from.
pub const DEFAULT_ISN_RANGE: Range<u32> = 1000..9999;

/// Adjustable endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Bound on each handshake wait after the opening SYN.
    pub handshake_timeout: Duration,
    /// Bound on the responder's wait for the opening SYN (`None` waits forever).
    pub accept_timeout: Option<Duration>,
    /// Size of the receive buffer handed to the socket, capped at
    /// [`MAX_DATAGRAM`].  Outbound messages are limited to fit it.
    pub max_datagram: usize,
    /// Half-open range for the random initial sequence number.
    pub isn_range: Range<u32>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            accept_timeout: None,
            max_datagram: DEFAULT_MAX_DATAGRAM,
            isn_range: DEFAULT_ISN_RANGE,
        }
    }
}

impl EndpointConfig {
    /// Override the handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Bound the responder's wait for a SYN.
    pub fn with_accept_timeout(mut self, timeout: Duration) -> Self {
        self.accept_timeout = Some(timeout);
        self
    }

    /// Override the receive buffer size (capped at [`MAX_DATAGRAM`]).
    pub fn with_max_datagram(mut self, len: usize) -> Self {
        self.max_datagram = len.min(MAX_DATAGRAM);
        self
    }

    /// Override the ISN range.  An empty range pins the ISN to `range.start`.
    pub fn with_isn_range(mut self, range: Range<u32>) -> Self {
        self.isn_range = range;
        self
    }
}
