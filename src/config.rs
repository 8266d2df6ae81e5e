//! Process-wide constants injected as configuration instead of left ambient.
//!
//! The original client kept `Session.VERSION` and `Session.FIELD_KEY` as
//! `pub const`s reached from anywhere. Here they're a value threaded through
//! `Connect` calls, so a test can exercise two differently-versioned clients
//! in the same process.

/// Compiled-in protocol identity a client presents during both handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Client build version, checked against the login server's handshake
    /// and re-sent verbatim in `ResponseVersion`.
    pub version: u32,
    /// Constant resent in `ResponseVersion`'s `unknown` field. Preserved
    /// exactly; see spec §9 on unknown-field magic numbers.
    pub version_constant: i16,
    /// Locale tag resent in `ResponseVersion`.
    pub locale: u32,
    /// Key echoed back in `ResponseFieldEnter` once a field has been
    /// entered.
    pub field_key: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: 12,
            version_constant: 47,
            locale: 0, // NA
            field_key: 0x1234,
        }
    }
}
