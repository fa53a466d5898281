use std::sync::Arc;

use shared::{
    domain::{sanitize_buttons, ServoButton},
    encoding::{decode_buttons, encode_buttons},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{error, warn};

use crate::{SettingsBackend, SERVO_BUTTONS_KEY, SERVO_SETTINGS_GROUP};

#[derive(Debug, Clone, PartialEq)]
pub enum ButtonStoreEvent {
    ButtonsChanged { buttons: Vec<ServoButton> },
}

/// Single source of truth for the persisted servo button list. The in-memory
/// list is sanitized on every read and write and stays authoritative even
/// when the settings backend misbehaves.
pub struct ButtonStore {
    settings: Arc<dyn SettingsBackend>,
    inner: Mutex<ButtonStoreState>,
    events: broadcast::Sender<ButtonStoreEvent>,
}

struct ButtonStoreState {
    buttons: Vec<ServoButton>,
    // Last encoding seen in or written to the backend, compared as text to
    // suppress redundant writes.
    persisted_encoding: String,
}

impl ButtonStore {
    pub async fn load(settings: Arc<dyn SettingsBackend>) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let store = Arc::new(Self {
            settings,
            inner: Mutex::new(ButtonStoreState {
                buttons: Vec::new(),
                persisted_encoding: String::new(),
            }),
            events,
        });
        store.reload().await;
        store
    }

    pub async fn buttons(&self) -> Vec<ServoButton> {
        self.inner.lock().await.buttons.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ButtonStoreEvent> {
        self.events.subscribe()
    }

    /// Sanitizes the candidate, persists it only when the encoding differs
    /// from what the backend already holds, and emits a change event only
    /// when the sanitized content differs from the current list.
    pub async fn set_buttons(&self, candidate: Vec<ServoButton>) {
        let sanitized = sanitize_buttons(&candidate);

        let mut changed = None;
        {
            let mut guard = self.inner.lock().await;
            match encode_buttons(&sanitized) {
                Ok(encoded) => {
                    if encoded != guard.persisted_encoding {
                        match self
                            .settings
                            .write_value(SERVO_SETTINGS_GROUP, SERVO_BUTTONS_KEY, &encoded)
                            .await
                        {
                            Ok(()) => guard.persisted_encoding = encoded,
                            Err(err) => {
                                error!(
                                    "panel: failed to persist button list, in-memory list stays authoritative: {err:#}"
                                );
                            }
                        }
                    }
                }
                Err(err) => error!("panel: failed to encode button list: {err}"),
            }

            if guard.buttons != sanitized {
                guard.buttons = sanitized.clone();
                changed = Some(sanitized);
            }
        }

        if let Some(buttons) = changed {
            let _ = self.events.send(ButtonStoreEvent::ButtonsChanged { buttons });
        }
    }

    /// Appends first, sanitizes after: an entry with a blank name is dropped
    /// silently instead of rejected.
    pub async fn add_button(&self, name: impl Into<String>, servo_output: i64, pulse_width: f64) {
        let mut candidate = self.buttons().await;
        candidate.push(ServoButton::new(name, servo_output, pulse_width));
        self.set_buttons(candidate).await;
    }

    pub async fn update_button(
        &self,
        index: usize,
        name: impl Into<String>,
        servo_output: i64,
        pulse_width: f64,
    ) {
        let mut candidate = self.buttons().await;
        if index >= candidate.len() {
            return;
        }
        candidate[index] = ServoButton::new(name, servo_output, pulse_width);
        self.set_buttons(candidate).await;
    }

    pub async fn remove_button(&self, index: usize) {
        let mut candidate = self.buttons().await;
        if index >= candidate.len() {
            return;
        }
        candidate.remove(index);
        self.set_buttons(candidate).await;
    }

    /// Re-reads the persisted encoding. Absent, empty or malformed values
    /// degrade to the empty list; the read path never writes back.
    pub async fn reload(&self) {
        let raw = match self
            .settings
            .read_value(SERVO_SETTINGS_GROUP, SERVO_BUTTONS_KEY)
            .await
        {
            Ok(value) => value.unwrap_or_default(),
            Err(err) => {
                warn!("panel: failed to read persisted button list, starting empty: {err:#}");
                String::new()
            }
        };

        let decoded = match decode_buttons(&raw) {
            Ok(buttons) => buttons,
            Err(err) => {
                warn!("panel: persisted button list is malformed, treating as empty: {err}");
                Vec::new()
            }
        };
        let sanitized = sanitize_buttons(&decoded);

        let mut changed = None;
        {
            let mut guard = self.inner.lock().await;
            guard.persisted_encoding = raw;
            if guard.buttons != sanitized {
                guard.buttons = sanitized.clone();
                changed = Some(sanitized);
            }
        }

        if let Some(buttons) = changed {
            let _ = self.events.send(ButtonStoreEvent::ButtonsChanged { buttons });
        }
    }
}

#[cfg(test)]
#[path = "tests/button_store_tests.rs"]
mod tests;
