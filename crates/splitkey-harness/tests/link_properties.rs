//! Property-based simulation of the radio link
//!
//! Random seeds, ack loss, entropy starvation and power cycles must never
//! break the rotation invariants:
//!
//! 1. **Safety**: every standard invariant holds after every step
//! 2. **Lockstep**: without resets a half is never ahead of the receiver's
//!    candidate
//! 3. **Liveness**: with a clean ack channel rotations keep completing

use proptest::prelude::*;
use splitkey_core::{Half, ReceiverConfig};
use splitkey_harness::{InvariantRegistry, SimConfig, SimLink};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_invariants_hold_under_faults(
        seed in any::<u64>(),
        ack_loss in 0.0f64..0.9,
        entropy_ready in 0.1f64..=1.0,
        rekey_interval in 0u32..16,
        reset_rate in 0.0f64..0.02,
    ) {
        let config = SimConfig {
            seed,
            receiver: ReceiverConfig { rekey_interval, ..ReceiverConfig::default() },
            ack_loss,
            entropy_ready,
            reset_rate,
            ..SimConfig::default()
        };
        let mut link = SimLink::new(config).unwrap();

        let result = link.run(400, &InvariantRegistry::standard());
        prop_assert!(result.is_ok(), "violations: {:?}", result);
    }

    #[test]
    fn prop_keyboard_never_ahead_of_receiver(
        seed in any::<u64>(),
        ack_loss in 0.0f64..0.9,
        rekey_interval in 0u32..8,
    ) {
        let config = SimConfig {
            seed,
            receiver: ReceiverConfig { rekey_interval, ..ReceiverConfig::default() },
            ack_loss,
            ..SimConfig::default()
        };
        let mut link = SimLink::new(config).unwrap();

        for _ in 0..300 {
            link.step();
            let snapshot = link.snapshot();
            for half in Half::ALL {
                let receiver = snapshot.receiver.half(half);
                let keyboard = snapshot.keyboard_key_ids[half.index()];
                prop_assert!(
                    keyboard == receiver.key_id || keyboard == receiver.new_key_id,
                    "{:?} keyboard on {} while receiver has {} / {}",
                    half, keyboard, receiver.key_id, receiver.new_key_id
                );
            }
        }
    }

    #[test]
    fn prop_clean_link_keeps_rotating(seed in any::<u64>()) {
        let config = SimConfig {
            seed,
            receiver: ReceiverConfig { rekey_interval: 2, ..ReceiverConfig::default() },
            press_rate: 1.0,
            ..SimConfig::default()
        };
        let mut link = SimLink::new(config).unwrap();

        link.run(200, &InvariantRegistry::standard()).unwrap();

        for half in Half::ALL {
            prop_assert!(link.transitions().iter().filter(|t| t.half == half).count() >= 3);
        }
    }
}
