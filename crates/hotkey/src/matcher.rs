//! Hotkey matching and rebinding
//!
//! `Listening` compares every key-down with the active chord.
//! `Rebinding` learns the next key-down that holds a tracked modifier.

use crate::store::HotkeyStore;
use crate::{HotkeyConfig, KeyEvent};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    Listening,
    Rebinding,
}

/// Result of feeding one key-down to the matcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Ignored,
    /// The active chord was pressed
    Triggered,
    Rebound(HotkeyConfig),
    RebindCancelled,
}

pub struct HotkeyMatcher {
    state: MatcherState,
    config: HotkeyConfig,
    store: Box<dyn HotkeyStore>,
}

impl HotkeyMatcher {
    /// Start listening with the stored chord (or the built-in default).
    pub fn new(store: Box<dyn HotkeyStore>) -> Self {
        let config = crate::store::load_or_default(store.as_ref());
        info!(event = "hotkey.matcher.loaded", chord = %config);
        Self {
            state: MatcherState::Listening,
            config,
            store,
        }
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    pub fn config(&self) -> HotkeyConfig {
        self.config
    }

    /// Enter rebinding. Returns false if already rebinding.
    pub fn begin_rebind(&mut self) -> bool {
        if self.state == MatcherState::Rebinding {
            return false;
        }
        self.state = MatcherState::Rebinding;
        info!(event = "hotkey.matcher.rebind_started");
        true
    }

    /// Replace the chord and persist it
    pub fn set_config(&mut self, config: HotkeyConfig) {
        self.config = config;
        if let Err(e) = self.store.save(&config) {
            // the new chord stays active for this run
            warn!(event = "hotkey.matcher.persist_failed", chord = %config, error = %e);
        }
    }

    /// Feed one key-down.
    pub fn handle_key_down(&mut self, event: &KeyEvent) -> KeyOutcome {
        match self.state {
            MatcherState::Listening => {
                if self.config.matches(event) {
                    debug!(event = "hotkey.matcher.triggered", key_code = event.key_code);
                    KeyOutcome::Triggered
                } else {
                    KeyOutcome::Ignored
                }
            }
            MatcherState::Rebinding => self.learn(event),
        }
    }

    fn learn(&mut self, event: &KeyEvent) -> KeyOutcome {
        // wait for the real key while modifiers are being pressed
        if event.is_repeat || event.is_modifier_key {
            return KeyOutcome::Ignored;
        }

        self.state = MatcherState::Listening;

        let modifiers = event.modifiers.tracked();
        if modifiers.is_empty() {
            info!(
                event = "hotkey.matcher.rebind_rejected",
                key_code = event.key_code,
                "Shortcut needs at least one modifier"
            );
            return KeyOutcome::RebindCancelled;
        }

        let config = HotkeyConfig::new(event.key_code, modifiers);
        self.set_config(config);
        info!(event = "hotkey.matcher.rebound", chord = %config);
        KeyOutcome::Rebound(config)
    }
}
