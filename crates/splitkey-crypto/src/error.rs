//! Error types for the cryptographic primitives.
//!
//! Every primitive returns a `Result`; nothing here panics or retries. The
//! caller decides whether an error drops a packet or stalls a rotation step.

use thiserror::Error;

/// Failure reported by a block oracle.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleError {
    /// The accelerator did not signal completion within the poll ceiling
    #[error("block oracle timed out after {polls} polls")]
    Timeout {
        /// Number of status polls spent before giving up
        polls: u32,
    },

    /// The accelerator reported an error event
    #[error("block oracle reported a hardware fault")]
    HardwareFault,
}

/// Errors from CTR, CMAC, CKDF and crypto-context operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The underlying block oracle failed
    #[error("oracle failure: {0}")]
    Oracle(#[from] OracleError),

    /// A MAC tag did not match the recomputed tag
    #[error("authentication failed")]
    Authentication,

    /// Requested derivation output exceeds what the KDF can produce
    #[error("protocol bounds exceeded: {what} of {requested} bytes, max {max}")]
    ProtocolBounds {
        /// Which bound was exceeded
        what: &'static str,
        /// Requested length
        requested: usize,
        /// Largest permitted length
        max: usize,
    },

    /// CTR input longer than a single keystream block
    #[error("input too long: {len} bytes, max {max}")]
    InputTooLong {
        /// Length of the rejected input
        len: usize,
        /// Largest permitted length
        max: usize,
    },

    /// The CTR counter reached `u32::MAX` and cannot produce a fresh block
    #[error("CTR counter exhausted")]
    CounterExhausted,

    /// CMAC `update`/`finish` called after `finish` without a restart
    #[error("CMAC context already finished")]
    ContextFinished,

    /// Key id 0 names the bootstrap generation and cannot be reinstalled
    #[error("key id 0 is reserved for the bootstrap generation")]
    ReservedKeyId,

    /// Key material failed validation
    #[error("invalid key material: {reason}")]
    InvalidKeyMaterial {
        /// What was wrong with it
        reason: &'static str,
    },

    /// Wire payload of the wrong size
    #[error("invalid payload length: expected {expected}, got {actual}")]
    InvalidPayloadLength {
        /// Exact wire size of the payload type
        expected: usize,
        /// Length of the bytes received
        actual: usize,
    },
}

impl CryptoError {
    /// Returns true if the error came from untrusted input rather than from
    /// the device itself.
    ///
    /// Untrusted-input errors are dropped silently by the packet pipelines.
    pub fn is_untrusted_input(&self) -> bool {
        matches!(self, Self::Authentication | Self::InvalidPayloadLength { .. })
    }

    /// Returns true if the error indicates a programming or configuration
    /// error that fixed protocol constants should never produce.
    pub fn is_internal(&self) -> bool {
        match self {
            Self::ProtocolBounds { .. }
            | Self::InputTooLong { .. }
            | Self::ContextFinished
            | Self::ReservedKeyId
            | Self::InvalidKeyMaterial { .. } => true,

            Self::Oracle(_)
            | Self::Authentication
            | Self::CounterExhausted
            | Self::InvalidPayloadLength { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_is_untrusted_input() {
        assert!(CryptoError::Authentication.is_untrusted_input());
        assert!(!CryptoError::Authentication.is_internal());
    }

    #[test]
    fn oracle_failure_is_neither_untrusted_nor_internal() {
        let err = CryptoError::from(OracleError::Timeout { polls: 16 });
        assert!(!err.is_untrusted_input());
        assert!(!err.is_internal());
    }

    #[test]
    fn bounds_failure_is_internal() {
        let err = CryptoError::ProtocolBounds { what: "expand output", requested: 4081, max: 4080 };
        assert!(err.is_internal());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::from(OracleError::Timeout { polls: 3 });
        assert_eq!(err.to_string(), "oracle failure: block oracle timed out after 3 polls");
    }
}
