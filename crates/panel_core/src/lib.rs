use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use settings::SettingsStore;
use shared::domain::{ComponentId, ServoButton};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

mod button_store;
pub use button_store::{ButtonStore, ButtonStoreEvent};

pub const SERVO_SETTINGS_GROUP: &str = "ServoControl";
pub const SERVO_BUTTONS_KEY: &str = "buttonsJson";

const NO_ACTIVE_VEHICLE_MESSAGE: &str = "No active vehicle to send servo command.";
const SERVO_UNSUPPORTED_MESSAGE: &str = "Vehicle does not support the set-servo command.";

#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn read_value(&self, group: &str, key: &str) -> Result<Option<String>>;
    async fn write_value(&self, group: &str, key: &str, value: &str) -> Result<()>;
}

pub struct MissingSettingsBackend;

#[async_trait]
impl SettingsBackend for MissingSettingsBackend {
    async fn read_value(&self, group: &str, key: &str) -> Result<Option<String>> {
        Err(anyhow!("settings backend unavailable for {group}/{key}"))
    }

    async fn write_value(&self, group: &str, key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("settings backend unavailable for {group}/{key}"))
    }
}

#[async_trait]
impl SettingsBackend for SettingsStore {
    async fn read_value(&self, group: &str, key: &str) -> Result<Option<String>> {
        SettingsStore::read_value(self, group, key).await
    }

    async fn write_value(&self, group: &str, key: &str, value: &str) -> Result<()> {
        SettingsStore::write_value(self, group, key, value).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VehicleCommand {
    SetServo { servo_output: i64, pulse_width: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    Unsupported,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleEvent {
    ActiveVehicleChanged,
}

#[async_trait]
pub trait Vehicle: Send + Sync {
    fn default_component_id(&self) -> ComponentId;
    async fn send_command(
        &self,
        component_id: ComponentId,
        command: VehicleCommand,
        show_error: bool,
    ) -> Result<CommandOutcome>;
}

#[async_trait]
pub trait VehicleManager: Send + Sync {
    async fn active_vehicle(&self) -> Option<Arc<dyn Vehicle>>;
    fn subscribe_changes(&self) -> broadcast::Receiver<VehicleEvent>;
}

pub struct MissingVehicleManager;

#[async_trait]
impl VehicleManager for MissingVehicleManager {
    async fn active_vehicle(&self) -> Option<Arc<dyn Vehicle>> {
        None
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<VehicleEvent> {
        let (sender, receiver) = broadcast::channel(1);
        drop(sender);
        receiver
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    ButtonsChanged { buttons: Vec<ServoButton> },
    ActiveButtonChanged { index: i32 },
    UserMessage { text: String },
}

/// Session-state façade over [`ButtonStore`]: tracks the most recently
/// triggered button and dispatches set-servo commands to the active vehicle.
/// The active index is never persisted.
pub struct ButtonPanelController {
    store: Arc<ButtonStore>,
    vehicle_manager: Arc<dyn VehicleManager>,
    inner: Mutex<PanelState>,
    servo_unsupported_warned: AtomicBool,
    events: broadcast::Sender<PanelEvent>,
}

struct PanelState {
    active_button_index: i32,
}

impl ButtonPanelController {
    pub fn new(store: Arc<ButtonStore>) -> Arc<Self> {
        Self::new_with_dependencies(store, Arc::new(MissingVehicleManager))
    }

    pub fn new_with_dependencies(
        store: Arc<ButtonStore>,
        vehicle_manager: Arc<dyn VehicleManager>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let controller = Arc::new(Self {
            store,
            vehicle_manager,
            inner: Mutex::new(PanelState {
                active_button_index: -1,
            }),
            servo_unsupported_warned: AtomicBool::new(false),
            events,
        });
        controller.spawn_store_event_task();
        controller.spawn_vehicle_change_task();
        controller
    }

    pub async fn buttons(&self) -> Vec<ServoButton> {
        self.store.buttons().await
    }

    pub async fn active_button_index(&self) -> i32 {
        self.inner.lock().await.active_button_index
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub async fn add_button(&self, name: impl Into<String>, servo_output: i64, pulse_width: f64) {
        let mut guard = self.inner.lock().await;
        self.store.add_button(name, servo_output, pulse_width).await;
        let changed =
            Self::reset_active_if_out_of_range(&mut guard, self.store.buttons().await.len());
        drop(guard);

        if let Some(index) = changed {
            let _ = self.events.send(PanelEvent::ActiveButtonChanged { index });
        }
    }

    pub async fn update_button(
        &self,
        index: usize,
        name: impl Into<String>,
        servo_output: i64,
        pulse_width: f64,
    ) {
        let mut guard = self.inner.lock().await;
        self.store
            .update_button(index, name, servo_output, pulse_width)
            .await;
        // An update can shrink the list: renaming an entry to whitespace drops it.
        let changed =
            Self::reset_active_if_out_of_range(&mut guard, self.store.buttons().await.len());
        drop(guard);

        if let Some(index) = changed {
            let _ = self.events.send(PanelEvent::ActiveButtonChanged { index });
        }
    }

    pub async fn remove_button(&self, index: usize) {
        let buttons = self.store.buttons().await;
        if index >= buttons.len() {
            return;
        }

        let mut guard = self.inner.lock().await;
        self.store.remove_button(index).await;

        let removed = index as i32;
        let changed = if guard.active_button_index == removed {
            guard.active_button_index = -1;
            Some(-1)
        } else if guard.active_button_index > removed {
            guard.active_button_index -= 1;
            Some(guard.active_button_index)
        } else {
            None
        };
        drop(guard);

        if let Some(index) = changed {
            let _ = self.events.send(PanelEvent::ActiveButtonChanged { index });
        }
    }

    /// Dispatch is fire-and-forget: the active index records which button was
    /// pressed, not whether the command round-trip succeeded.
    pub async fn trigger_button(self: &Arc<Self>, index: usize) {
        let buttons = self.store.buttons().await;
        let Some(button) = buttons.get(index).cloned() else {
            return;
        };

        let Some(vehicle) = self.vehicle_manager.active_vehicle().await else {
            let _ = self.events.send(PanelEvent::UserMessage {
                text: NO_ACTIVE_VEHICLE_MESSAGE.to_string(),
            });
            return;
        };

        self.dispatch_set_servo(vehicle, button);

        let mut should_emit = false;
        {
            let mut guard = self.inner.lock().await;
            if guard.active_button_index != index as i32 {
                guard.active_button_index = index as i32;
                should_emit = true;
            }
        }
        if should_emit {
            let _ = self.events.send(PanelEvent::ActiveButtonChanged {
                index: index as i32,
            });
        }
    }

    pub async fn handle_active_vehicle_changed(&self) {
        let mut should_emit = false;
        {
            let mut guard = self.inner.lock().await;
            if guard.active_button_index != -1 {
                guard.active_button_index = -1;
                should_emit = true;
            }
        }
        if should_emit {
            let _ = self
                .events
                .send(PanelEvent::ActiveButtonChanged { index: -1 });
        }
    }

    fn dispatch_set_servo(self: &Arc<Self>, vehicle: Arc<dyn Vehicle>, button: ServoButton) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let command = VehicleCommand::SetServo {
                servo_output: button.servo_output,
                pulse_width: button.pulse_width,
            };
            let component_id = vehicle.default_component_id();
            match vehicle.send_command(component_id, command, true).await {
                Ok(CommandOutcome::Accepted) => {
                    info!(
                        "panel: servo command accepted output={} pulse_width={}",
                        button.servo_output, button.pulse_width
                    );
                }
                Ok(CommandOutcome::Unsupported) => {
                    warn!(
                        "panel: vehicle reported set-servo unsupported output={}",
                        button.servo_output
                    );
                    if !controller
                        .servo_unsupported_warned
                        .swap(true, Ordering::SeqCst)
                    {
                        let _ = controller.events.send(PanelEvent::UserMessage {
                            text: SERVO_UNSUPPORTED_MESSAGE.to_string(),
                        });
                    }
                }
                Ok(CommandOutcome::Failed) => {
                    warn!(
                        "panel: servo command failed output={} pulse_width={}",
                        button.servo_output, button.pulse_width
                    );
                }
                Err(err) => {
                    warn!("panel: servo command dispatch error: {err:#}");
                }
            }
        });
    }

    fn spawn_store_event_task(self: &Arc<Self>) {
        let mut events = self.store.subscribe_events();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                let ButtonStoreEvent::ButtonsChanged { buttons } = event;
                let reset = {
                    let mut guard = controller.inner.lock().await;
                    Self::reset_active_if_out_of_range(&mut guard, buttons.len())
                };

                let _ = controller
                    .events
                    .send(PanelEvent::ButtonsChanged { buttons });
                if let Some(index) = reset {
                    let _ = controller
                        .events
                        .send(PanelEvent::ActiveButtonChanged { index });
                }
            }
        });
    }

    fn spawn_vehicle_change_task(self: &Arc<Self>) {
        let mut changes = self.vehicle_manager.subscribe_changes();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            while let Ok(event) = changes.recv().await {
                match event {
                    VehicleEvent::ActiveVehicleChanged => {
                        controller.handle_active_vehicle_changed().await;
                    }
                }
            }
        });
    }

    fn reset_active_if_out_of_range(state: &mut PanelState, len: usize) -> Option<i32> {
        if state.active_button_index >= len as i32 {
            state.active_button_index = -1;
            return Some(-1);
        }
        None
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
