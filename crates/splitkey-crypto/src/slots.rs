//! Key-generation slots.
//!
//! A rotating identity keeps up to three live generations so packets under
//! the previous key still verify while a new key waits for confirmation:
//!
//! | Slot        | Holds                                    |
//! |-------------|------------------------------------------|
//! | `Bootstrap` | key id 0, derived from the master secret |
//! | `GenA`      | even rotated key ids                     |
//! | `GenB`      | odd rotated key ids                      |
//!
//! A slot only answers for the key id currently installed in it. A packet
//! naming id 6 does not verify against a `GenA` slot that holds id 4.

use crate::{
    context::{CryptoContext, Identity, KeyMaterial},
    error::CryptoError,
    oracle::BlockOracle,
};

/// Key id of the permanent bootstrap generation.
pub const BOOTSTRAP_KEY_ID: u8 = 0;

/// Storage location of one key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Key id 0
    Bootstrap,
    /// Even nonzero key ids
    GenA,
    /// Odd key ids
    GenB,
}

impl Slot {
    /// All slots in index order.
    pub const ALL: [Self; 3] = [Self::Bootstrap, Self::GenA, Self::GenB];

    /// Slot that stores generation `key_id`.
    pub fn for_key_id(key_id: u8) -> Self {
        match key_id {
            BOOTSTRAP_KEY_ID => Self::Bootstrap,
            id if id & 1 == 0 => Self::GenA,
            _ => Self::GenB,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Bootstrap => 0,
            Self::GenA => 1,
            Self::GenB => 2,
        }
    }
}

/// The key id to propose after `current`.
///
/// Wraps past 255 without landing on the reserved bootstrap id. When the wrap
/// would put the candidate in the same slot as `current` (255 and 1 are both
/// odd) it moves on to 2, so a candidate never evicts the live generation.
pub fn next_key_id(current: u8) -> u8 {
    match current.wrapping_add(1) {
        BOOTSTRAP_KEY_ID => {
            if Slot::for_key_id(1) == Slot::for_key_id(current) {
                2
            } else {
                1
            }
        },
        next => next,
    }
}

/// An installed key generation.
#[derive(Debug, Clone)]
pub struct Generation {
    key_id: u8,
    context: CryptoContext,
    high_water: Option<u32>,
}

impl Generation {
    fn new(key_id: u8, context: CryptoContext) -> Self {
        Self { key_id, context, high_water: None }
    }

    /// Key id of this generation.
    pub fn key_id(&self) -> u8 {
        self.key_id
    }

    /// The generation's crypto context.
    pub fn context(&self) -> &CryptoContext {
        &self.context
    }

    /// Mutable crypto context.
    pub fn context_mut(&mut self) -> &mut CryptoContext {
        &mut self.context
    }

    /// Highest counter accepted under this generation, if any.
    pub fn high_water(&self) -> Option<u32> {
        self.high_water
    }

    /// True if `counter` has not been accepted under this generation yet.
    pub fn is_fresh(&self, counter: u32) -> bool {
        self.high_water.is_none_or(|seen| counter > seen)
    }

    /// Raise the high-water mark to `counter`.
    pub fn record(&mut self, counter: u32) {
        self.high_water = Some(self.high_water.map_or(counter, |seen| seen.max(counter)));
    }
}

/// The three generation slots of one rotating identity.
///
/// # Invariants
///
/// - The bootstrap slot is always occupied by key id 0
/// - Every occupied slot `s` holds a key id with `Slot::for_key_id(id) == s`
#[derive(Debug, Clone)]
pub struct KeyGenerationSlots {
    identity: Identity,
    bootstrap: Generation,
    rotated: [Option<Generation>; 2],
}

impl KeyGenerationSlots {
    /// Slots holding only `bootstrap`.
    pub fn new(bootstrap: CryptoContext) -> Self {
        Self {
            identity: bootstrap.identity(),
            bootstrap: Generation::new(BOOTSTRAP_KEY_ID, bootstrap),
            rotated: [None, None],
        }
    }

    /// Derive the bootstrap generation for `identity` and wrap it.
    pub fn init<O: BlockOracle + ?Sized>(
        oracle: &O,
        material: &KeyMaterial,
        identity: Identity,
    ) -> Result<Self, CryptoError> {
        Ok(Self::new(CryptoContext::init(oracle, material, identity)?))
    }

    /// Identity the slots belong to.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// The generation installed for `key_id`, if that exact id is present.
    pub fn get(&self, key_id: u8) -> Option<&Generation> {
        self.slot(Slot::for_key_id(key_id)).filter(|generation| generation.key_id == key_id)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, key_id: u8) -> Option<&mut Generation> {
        let generation = match Slot::for_key_id(key_id) {
            Slot::Bootstrap => Some(&mut self.bootstrap),
            slot => self.rotated[slot.index() - 1].as_mut(),
        };
        generation.filter(|generation| generation.key_id == key_id)
    }

    /// Whatever generation occupies `slot`.
    pub fn slot(&self, slot: Slot) -> Option<&Generation> {
        match slot {
            Slot::Bootstrap => Some(&self.bootstrap),
            slot => self.rotated[slot.index() - 1].as_ref(),
        }
    }

    /// Key id currently stored in `slot`.
    pub fn slot_key_id(&self, slot: Slot) -> Option<u8> {
        self.slot(slot).map(Generation::key_id)
    }

    /// Install `context` as generation `key_id`, evicting whatever shared its
    /// slot.
    ///
    /// # Errors
    ///
    /// - `ReservedKeyId` for key id 0; the bootstrap generation is immutable
    pub fn install(&mut self, key_id: u8, context: CryptoContext) -> Result<(), CryptoError> {
        let slot = Slot::for_key_id(key_id);
        if slot == Slot::Bootstrap {
            return Err(CryptoError::ReservedKeyId);
        }

        self.rotated[slot.index() - 1] = Some(Generation::new(key_id, context));
        Ok(())
    }
}
