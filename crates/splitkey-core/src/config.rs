//! Receiver configuration.

/// Packets a half may send under its confirmed key before the receiver
/// starts pushing the pending rotation at it.
pub const DEFAULT_REKEY_INTERVAL: u32 = 100;

/// Ticks without an authenticated packet before a half's keys are released.
pub const DEFAULT_INACTIVITY_TICKS: u32 = 100_000;

/// Receiver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Counter threshold under the confirmed key that triggers proactive
    /// seed re-send (strictly greater than)
    pub rekey_interval: u32,
    /// Inactivity ticks before a `ClearKeys` action
    pub inactivity_ticks: u32,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self { rekey_interval: DEFAULT_REKEY_INTERVAL, inactivity_ticks: DEFAULT_INACTIVITY_TICKS }
    }
}
