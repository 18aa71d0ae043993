//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on snapshots rather than live state so every check in a
//! pass sees the same moment.

use splitkey_core::{Half, ReceiverSnapshot};

/// A change of a half's confirmed key id, as seen by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Half whose key changed
    pub half: Half,
    /// Confirmed key id before the packet
    pub from: u8,
    /// Confirmed key id after the packet
    pub to: u8,
    /// Candidate key id before the packet
    pub candidate: u8,
}

/// Snapshot of the simulated link.
///
/// Borrows the transition log so taking a snapshot every step stays cheap.
#[derive(Debug, Clone)]
pub struct SystemSnapshot<'a> {
    /// Receiver state for both halves
    pub receiver: ReceiverSnapshot,
    /// Key id each keyboard half is sending under, by [`Half::index`]
    pub keyboard_key_ids: [u8; 2],
    /// Every confirmed key change so far, oldest first
    pub transitions: &'a [Transition],
}
