//! Keyboard halves.

use splitkey_crypto::Identity;

/// One physical half of the keyboard, which is also its radio channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Half {
    /// Left half
    Left,
    /// Right half
    Right,
}

impl Half {
    /// Both halves in channel order.
    pub const ALL: [Self; 2] = [Self::Left, Self::Right];

    /// Crypto identity whose keys this half sends under.
    pub fn identity(self) -> Identity {
        match self {
            Self::Left => Identity::LeftKeyboard,
            Self::Right => Identity::RightKeyboard,
        }
    }

    /// Radio channel index.
    pub fn index(self) -> usize {
        match self {
            Self::Left => 0,
            Self::Right => 1,
        }
    }
}
