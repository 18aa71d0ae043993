//! Error types for the packet pipelines.
//!
//! Every inbound packet either yields a keymask or one of these errors. None
//! of them is fatal to the device: the packet is dropped, a diagnostic
//! counter moves, and the next packet is handled normally.

use splitkey_crypto::CryptoError;
use thiserror::Error;

/// Why a packet was not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Wrong length for the expected payload
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Exact payload size
        expected: usize,
        /// Received length
        actual: usize,
    },

    /// CMAC tag mismatch
    #[error("authentication failed")]
    Authentication,

    /// Authentic packet whose counter was already accepted
    #[error("replayed counter {counter} for key id {key_id} (high water {high_water})")]
    Replay {
        /// Generation the packet named
        key_id: u8,
        /// Counter the packet carried
        counter: u32,
        /// Highest counter already accepted
        high_water: u32,
    },

    /// Key id with no installed generation
    #[error("no generation installed for key id {key_id}")]
    UnknownGeneration {
        /// Key id the packet named
        key_id: u8,
    },

    /// The shared crypto resource was busy and the operation was dropped
    #[error("crypto resource busy")]
    Busy,

    /// Oracle or other crypto failure on our side
    #[error("crypto failure: {0}")]
    Crypto(#[source] CryptoError),
}

impl PacketError {
    /// Returns true if the packet itself was bad rather than our handling of
    /// it.
    pub fn is_untrusted_input(&self) -> bool {
        matches!(
            self,
            Self::Malformed { .. }
                | Self::Authentication
                | Self::Replay { .. }
                | Self::UnknownGeneration { .. }
        )
    }

    /// Returns true if the sender looks out of step with our keys, which is
    /// the cue to re-send a pending rotation.
    ///
    /// A half that reset lost its rotated keys and falls back to the
    /// bootstrap generation, which shows up as a MAC failure, a replay or a
    /// generation we no longer hold.
    pub fn suggests_stale_peer(&self) -> bool {
        matches!(self, Self::Authentication | Self::Replay { .. } | Self::UnknownGeneration { .. })
    }

    /// Returns true if the error points at a bug or misconfiguration rather
    /// than a transient condition.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Crypto(err) => err.is_internal(),
            Self::Malformed { .. }
            | Self::Authentication
            | Self::Replay { .. }
            | Self::UnknownGeneration { .. }
            | Self::Busy => false,
        }
    }
}

impl From<CryptoError> for PacketError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Authentication => Self::Authentication,
            CryptoError::InvalidPayloadLength { expected, actual } => {
                Self::Malformed { expected, actual }
            },
            other => Self::Crypto(other),
        }
    }
}
