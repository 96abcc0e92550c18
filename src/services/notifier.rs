// src/services/notifier.rs
use std::sync::Mutex;

use tracing::info;

/// Haptic feedback strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Haptic {
    Success,
    Warning,
}

/// Side effects the lifecycle asks the shell to perform. Keeping these as
/// data lets the transition function stay pure and the tests assert on them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Toast(String),
    Haptic(Haptic),
    NavigateToRating { ride_id: String },
    OpenDestinationSelector,
    /// User action failed but can be retried; state was left unchanged.
    RetryableError(String),
    /// User action was refused outright (e.g. cancelling a ride in progress).
    Blocked(String),
    NewMessage,
}

/// Sink for lifecycle effects. The app shell maps these onto toasts,
/// haptics, and navigation; tests record them.
pub trait RiderNotifier: Send + Sync {
    fn notify(&self, effect: Effect);
}

/// Logs effects; used by the headless binary.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl RiderNotifier for LogNotifier {
    fn notify(&self, effect: Effect) {
        info!(effect = ?effect, "UI effect");
    }
}

/// Records every effect for test assertions.
#[derive(Debug, Default)]
pub struct MockNotifier {
    pub effects: Mutex<Vec<Effect>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<Effect> {
        std::mem::take(&mut self.effects.lock().expect("notifier lock poisoned"))
    }

    pub fn contains(&self, effect: &Effect) -> bool {
        self.effects
            .lock()
            .expect("notifier lock poisoned")
            .iter()
            .any(|e| e == effect)
    }
}

impl RiderNotifier for MockNotifier {
    fn notify(&self, effect: Effect) {
        self.effects
            .lock()
            .expect("notifier lock poisoned")
            .push(effect);
    }
}
