//! Diagnostic counters.
//!
//! Failures at this layer are never reported to a user. They only move these
//! counters, which an external collaborator (telemetry, UART dump) reads.

/// Receiver-side counters, summed over both halves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverDiagnostics {
    /// Authenticated, fresh packets decrypted
    pub packets_accepted: u32,
    /// Packets whose CMAC did not match
    pub cmac_fail: u32,
    /// Oracle failures while authenticating or decrypting
    pub decrypt_fail: u32,
    /// Authentic packets with an already-seen counter
    pub replays: u32,
    /// Packets naming a generation we do not hold
    pub unknown_generation: u32,
    /// Packets of the wrong length
    pub malformed: u32,
    /// Rotation steps that failed and will be retried
    pub rotation_step_failures: u32,
    /// Seed payloads attached to acknowledgements
    pub seeds_attached: u32,
    /// Candidate generations confirmed by traffic
    pub rotations_confirmed: u32,
    /// Inactivity timeouts that released a half's keys
    pub inactivity_clears: u32,
    /// Operations dropped because the crypto resource was busy
    pub collisions: u32,
}

/// Keyboard-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardDiagnostics {
    /// Data payloads produced
    pub packets_sent: u32,
    /// Sends that failed in the oracle or on counter exhaustion
    pub encrypt_failures: u32,
    /// Sends dropped because the crypto resource was busy
    pub encrypt_collisions: u32,
    /// Seed payloads that authenticated
    pub rekey_cmac_success: u32,
    /// Seed payloads that failed authentication
    pub rekey_cmac_failure: u32,
    /// Authenticated seeds that could not be decrypted or derived
    pub rekey_decrypt_failure: u32,
    /// Acknowledgements of the wrong length
    pub malformed_acks: u32,
}

/// Count one event. Saturates so a flood of forged traffic cannot overflow
/// a counter.
pub(crate) fn bump(counter: &mut u32) {
    *counter = counter.saturating_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_counts_up() {
        let mut diagnostics = ReceiverDiagnostics::default();
        bump(&mut diagnostics.cmac_fail);
        bump(&mut diagnostics.cmac_fail);
        assert_eq!(diagnostics.cmac_fail, 2);
    }

    #[test]
    fn bump_saturates_at_max() {
        let mut counter = u32::MAX;
        bump(&mut counter);
        assert_eq!(counter, u32::MAX);
    }
}
