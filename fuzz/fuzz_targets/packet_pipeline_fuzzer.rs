//! Fuzz target for the receiver packet pipeline
//!
//! Attacker controls every byte on the air (HIGH priority)
//!
//! # Strategy
//!
//! - Interleave genuine keyboard traffic with forged, truncated and
//!   bit-flipped packets on either channel
//! - Background polls with attacker-chosen entropy
//! - Acknowledgements fed back to the keyboards, possibly corrupted
//!
//! # Invariants
//!
//! - Forged or mutated packets never update host keys
//! - A genuine packet is accepted at most once
//! - The bootstrap generation is never evicted

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use splitkey_core::{
    AckOutcome, Half, KeyboardHalf, RandomSource, Receiver, ReceiverAction, ReceiverConfig,
};
use splitkey_crypto::{KeyMaterial, SoftwareAes};

#[derive(Debug, Clone, Copy, Arbitrary)]
enum Side {
    Left,
    Right,
}

impl From<Side> for Half {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Half::Left,
            Side::Right => Half::Right,
        }
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Genuine { side: Side, keys: [u8; 3] },
    Mutated { side: Side, keys: [u8; 3], byte: u8, mask: u8 },
    Forged { side: Side, bytes: Vec<u8> },
    ReplayLast { side: Side },
    Poll { entropy: Vec<u8> },
    CorruptAck { side: Side, byte: u8, mask: u8 },
}

/// Entropy drawn from the fuzzer input, then exhausted.
struct Bytes(Vec<u8>);

impl RandomSource for Bytes {
    fn poll_byte(&mut self) -> Option<u8> {
        self.0.pop()
    }
}

fn updates_keys(actions: &[ReceiverAction]) -> bool {
    actions.iter().any(|action| matches!(action, ReceiverAction::UpdateKeys { .. }))
}

fuzz_target!(|input: (u8, Vec<Op>)| {
    let (interval, ops) = input;
    let config = ReceiverConfig { rekey_interval: u32::from(interval % 8), ..Default::default() };
    let receiver = Receiver::new(SoftwareAes, KeyMaterial::default(), config).unwrap();
    let keyboards = [
        KeyboardHalf::new(SoftwareAes, KeyMaterial::default(), Half::Left).unwrap(),
        KeyboardHalf::new(SoftwareAes, KeyMaterial::default(), Half::Right).unwrap(),
    ];
    let mut last_packet: [Option<[u8; 24]>; 2] = [None, None];
    let mut last_ack: [Option<[u8; 32]>; 2] = [None, None];

    for op in ops {
        match op {
            Op::Genuine { side, keys } => {
                let half = Half::from(side);
                let bytes = keyboards[half.index()].send(&keys).unwrap();
                let actions = receiver.on_packet(half, &bytes);
                for action in &actions {
                    if let ReceiverAction::AttachAck { payload, .. } = action {
                        last_ack[half.index()] = Some(*payload);
                        let _ = keyboards[half.index()].on_ack(payload);
                    }
                }
                last_packet[half.index()] = Some(bytes);
            },
            Op::Mutated { side, keys, byte, mask } => {
                if mask == 0 {
                    continue;
                }
                let half = Half::from(side);
                let mut bytes = keyboards[half.index()].send(&keys).unwrap();
                bytes[usize::from(byte) % bytes.len()] ^= mask;
                let actions = receiver.on_packet(half, &bytes);
                assert!(!updates_keys(&actions), "mutated packet updated keys");
            },
            Op::Forged { side, bytes } => {
                let actions = receiver.on_packet(Half::from(side), &bytes);
                assert!(!updates_keys(&actions), "forged packet updated keys");
            },
            Op::ReplayLast { side } => {
                let half = Half::from(side);
                if let Some(bytes) = last_packet[half.index()] {
                    let actions = receiver.on_packet(half, &bytes);
                    assert!(!updates_keys(&actions), "replayed packet updated keys");
                }
            },
            Op::Poll { entropy } => {
                let mut source = Bytes(entropy);
                while receiver.poll(&mut source) {}
            },
            Op::CorruptAck { side, byte, mask } => {
                let half = Half::from(side);
                if let Some(mut ack) = last_ack[half.index()] {
                    let before = keyboards[half.index()].key_id();
                    ack[usize::from(byte) % ack.len()] ^= mask;
                    let outcome = keyboards[half.index()].on_ack(&ack);
                    if mask != 0 {
                        assert!(!matches!(outcome, Ok(AckOutcome::Rekeyed { .. })));
                        assert_eq!(keyboards[half.index()].key_id(), before);
                    }
                }
            },
        }

        let snapshot = receiver.snapshot();
        for half in Half::ALL {
            assert_eq!(snapshot.half(half).slot_key_ids[0], Some(0));
        }
    }
});
