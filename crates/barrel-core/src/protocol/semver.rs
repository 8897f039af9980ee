//! Three-byte protocol version and the handshake compatibility rule.
//!
//! # Compatibility rule
//!
//! A server accepts a client when both speak the same **major** version and
//! the server's **minor** version is at least the client's:
//!
//! ```text
//! server 1.5.x  +  client 1.3.x   → accepted (server knows everything 1.3 sends)
//! server 1.2.x  +  client 1.3.x   → rejected (client may use 1.3 features)
//! server 2.0.x  +  client 1.9.x   → rejected (major bump = breaking change)
//! ```
//!
//! The patch number never affects compatibility.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version the server advertises and checks clients against.
pub const SERVER_VERSION: SemVer = SemVer::new(0, 5, 0);

/// A `major.minor.patch` version, one byte per component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SemVer {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl SemVer {
    /// Creates a version from its three components.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Reads a version from the first three bytes of a handshake.
    pub const fn from_bytes(bytes: [u8; 3]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2])
    }

    /// Returns the three wire bytes `[major, minor, patch]`.
    pub const fn to_bytes(self) -> [u8; 3] {
        [self.major, self.minor, self.patch]
    }

    /// Returns `true` if a server at `self` can serve a client at `client`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use barrel_core::protocol::semver::SemVer;
    ///
    /// let server = SemVer::new(1, 5, 0);
    /// assert!(server.is_compatible_with(SemVer::new(1, 3, 0)));
    /// assert!(!server.is_compatible_with(SemVer::new(1, 6, 0)));
    /// ```
    pub const fn is_compatible_with(self, client: SemVer) -> bool {
        self.major == client.major && self.minor >= client.minor
    }
}

/// Free-function form of [`SemVer::is_compatible_with`].
pub const fn compatible(server: SemVer, client: SemVer) -> bool {
    server.is_compatible_with(client)
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}
