//! Key chords: a key code plus a modifier set

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Modifier bitset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const NONE: Modifiers = Modifiers(0);
    pub const CONTROL: Modifiers = Modifiers(1 << 0);
    /// Alt on Windows
    pub const OPTION: Modifiers = Modifiers(1 << 1);
    pub const SHIFT: Modifiers = Modifiers(1 << 2);
    /// Windows key on Windows
    pub const COMMAND: Modifiers = Modifiers(1 << 3);
    pub const CAPS_LOCK: Modifiers = Modifiers(1 << 4);
    pub const FUNCTION: Modifiers = Modifiers(1 << 5);

    /// The set that takes part in matching
    pub const TRACKED: Modifiers = Modifiers(0b1111);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        Modifiers(bits)
    }

    pub const fn union(self, other: Modifiers) -> Self {
        Modifiers(self.0 | other.0)
    }

    pub const fn contains(self, other: Modifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Drop bits outside [`Modifiers::TRACKED`]
    pub const fn tracked(self) -> Self {
        Modifiers(self.0 & Self::TRACKED.0)
    }

    pub fn insert(&mut self, other: Modifiers) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Modifiers) -> Modifiers {
        self.union(rhs)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Modifiers::CONTROL, "Ctrl"),
            (Modifiers::OPTION, "Alt"),
            (Modifiers::SHIFT, "Shift"),
            (Modifiers::COMMAND, "Win"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str("+")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// One observed key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key_code: u32,
    /// Everything held, including untracked modifiers
    pub modifiers: Modifiers,
    pub is_repeat: bool,
    /// The key itself is a modifier (Ctrl, Shift, ...)
    pub is_modifier_key: bool,
}

impl KeyEvent {
    pub fn new(key_code: u32, modifiers: Modifiers) -> Self {
        Self {
            key_code,
            modifiers,
            is_repeat: false,
            is_modifier_key: false,
        }
    }

    pub fn repeated(mut self) -> Self {
        self.is_repeat = true;
        self
    }
}

/// Receives key-downs from the platform hook thread
pub type KeySink = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// Built-in chord: Ctrl+Alt+P
pub const DEFAULT_KEY_CODE: u32 = 0x50;
pub const DEFAULT_MODIFIERS: Modifiers = Modifiers::CONTROL.union(Modifiers::OPTION);

/// Active global shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub key_code: u32,
    pub modifiers: Modifiers,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            key_code: DEFAULT_KEY_CODE,
            modifiers: DEFAULT_MODIFIERS,
        }
    }
}

impl HotkeyConfig {
    pub fn new(key_code: u32, modifiers: Modifiers) -> Self {
        Self {
            key_code,
            modifiers: modifiers.tracked(),
        }
    }

    /// Exact key code and exact tracked-modifier equality; repeats never match.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        !event.is_repeat
            && event.key_code == self.key_code
            && event.modifiers.tracked() == self.modifiers.tracked()
    }
}

impl fmt::Display for HotkeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.modifiers.is_empty() {
            write!(f, "{}+", self.modifiers)?;
        }
        match self.key_code {
            0x30..=0x39 | 0x41..=0x5A => write!(f, "{}", self.key_code as u8 as char),
            0x70..=0x87 => write!(f, "F{}", self.key_code - 0x6F),
            code => write!(f, "0x{:02X}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: u32 = 0x4B;

    #[test]
    fn matches_exact_tracked_set_only() {
        let config = HotkeyConfig::new(K, Modifiers::CONTROL | Modifiers::SHIFT);
        let held = Modifiers::CONTROL | Modifiers::SHIFT;

        assert!(config.matches(&KeyEvent::new(K, held)));
        // untracked extras are ignored
        assert!(config.matches(&KeyEvent::new(K, held | Modifiers::CAPS_LOCK | Modifiers::FUNCTION)));

        for bits in 0..=Modifiers::TRACKED.bits() {
            let other = Modifiers::from_bits(bits);
            if other != held {
                assert!(!config.matches(&KeyEvent::new(K, other)), "matched {:?}", other);
            }
        }
        assert!(!config.matches(&KeyEvent::new(K + 1, held)));
    }

    #[test]
    fn repeats_never_match() {
        let config = HotkeyConfig::default();
        let event = KeyEvent::new(DEFAULT_KEY_CODE, DEFAULT_MODIFIERS);
        assert!(config.matches(&event));
        assert!(!config.matches(&event.repeated()));
    }

    #[test]
    fn display_names_chord() {
        assert_eq!(HotkeyConfig::default().to_string(), "Ctrl+Alt+P");
        let f5 = HotkeyConfig::new(0x74, Modifiers::SHIFT | Modifiers::COMMAND);
        assert_eq!(f5.to_string(), "Shift+Win+F5");
    }

    #[test]
    fn new_drops_untracked_bits() {
        let config = HotkeyConfig::new(K, Modifiers::SHIFT | Modifiers::CAPS_LOCK);
        assert_eq!(config.modifiers, Modifiers::SHIFT);
    }
}
