use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use camera_control::{CameraController, UdpCameraLink};
use clap::Parser;
use panel_core::{
    ButtonPanelController, ButtonStore, CommandOutcome, PanelEvent, Vehicle, VehicleCommand,
    VehicleEvent, VehicleManager,
};
use settings::SettingsStore;
use shared::domain::ComponentId;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{error, info};

mod config;

use config::{load_settings, prepare_database_url};

#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    database_url: Option<String>,
    #[arg(long)]
    camera_address: Option<String>,
}

/// Stand-in for the MAVLink vehicle link: accepts every set-servo command and
/// logs what would go out on the wire.
struct LoggedVehicle;

#[async_trait]
impl Vehicle for LoggedVehicle {
    fn default_component_id(&self) -> ComponentId {
        ComponentId(1)
    }

    async fn send_command(
        &self,
        component_id: ComponentId,
        command: VehicleCommand,
        _show_error: bool,
    ) -> Result<CommandOutcome> {
        let VehicleCommand::SetServo {
            servo_output,
            pulse_width,
        } = command;
        info!(
            "panel: would send DO_SET_SERVO to component {} output={servo_output} pulse_width={pulse_width}",
            component_id.0
        );
        Ok(CommandOutcome::Accepted)
    }
}

struct LoggedVehicleManager {
    vehicle: Arc<dyn Vehicle>,
    changes: broadcast::Sender<VehicleEvent>,
}

impl LoggedVehicleManager {
    fn new() -> Self {
        let (changes, _) = broadcast::channel(8);
        Self {
            vehicle: Arc::new(LoggedVehicle),
            changes,
        }
    }
}

#[async_trait]
impl VehicleManager for LoggedVehicleManager {
    async fn active_vehicle(&self) -> Option<Arc<dyn Vehicle>> {
        Some(self.vehicle.clone())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<VehicleEvent> {
        self.changes.subscribe()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = load_settings();
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_level.as_str())
        .init();

    let raw_database_url = args
        .database_url
        .unwrap_or_else(|| settings.database_url.clone());
    let database_url = prepare_database_url(&raw_database_url)?;
    let settings_store = SettingsStore::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite settings database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let store = ButtonStore::load(Arc::new(settings_store)).await;
    let controller = ButtonPanelController::new_with_dependencies(
        store,
        Arc::new(LoggedVehicleManager::new()),
    );

    let camera_address: SocketAddr = args
        .camera_address
        .unwrap_or_else(|| settings.camera_address.clone())
        .parse()
        .context("camera address is not a valid socket address")?;
    let camera = CameraController::new(UdpCameraLink::new(camera_address).await?);

    spawn_event_printer(&controller);

    info!(%database_url, %camera_address, "panel ready, type 'help' for commands");
    run_command_loop(controller, camera).await
}

fn spawn_event_printer(controller: &Arc<ButtonPanelController>) {
    let mut events = controller.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                PanelEvent::ButtonsChanged { buttons } => {
                    println!("buttons changed ({} entries)", buttons.len());
                }
                PanelEvent::ActiveButtonChanged { index } => {
                    println!("active button: {index}");
                }
                PanelEvent::UserMessage { text } => println!("{text}"),
            }
        }
    });
}

async fn run_command_loop(
    controller: Arc<ButtonPanelController>,
    camera: CameraController<UdpCameraLink>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => {}
            ["help"] => print_help(),
            ["list"] => {
                let buttons = controller.buttons().await;
                let active = controller.active_button_index().await;
                if buttons.is_empty() {
                    println!("no buttons configured");
                }
                for (index, button) in buttons.iter().enumerate() {
                    let marker = if index as i32 == active { "*" } else { " " };
                    println!(
                        "{marker} {index}: {} output={} pulse_width={}",
                        button.name, button.servo_output, button.pulse_width
                    );
                }
            }
            ["add", name, output, pulse] => {
                match (output.parse::<i64>(), pulse.parse::<f64>()) {
                    (Ok(servo_output), Ok(pulse_width)) => {
                        controller.add_button(*name, servo_output, pulse_width).await;
                    }
                    _ => println!("usage: add <name> <servo-output> <pulse-width>"),
                }
            }
            ["update", index, name, output, pulse] => {
                match (
                    index.parse::<usize>(),
                    output.parse::<i64>(),
                    pulse.parse::<f64>(),
                ) {
                    (Ok(index), Ok(servo_output), Ok(pulse_width)) => {
                        controller
                            .update_button(index, *name, servo_output, pulse_width)
                            .await;
                    }
                    _ => println!("usage: update <index> <name> <servo-output> <pulse-width>"),
                }
            }
            ["remove", index] => match index.parse::<usize>() {
                Ok(index) => controller.remove_button(index).await,
                Err(_) => println!("usage: remove <index>"),
            },
            ["trigger", index] => match index.parse::<usize>() {
                Ok(index) => controller.trigger_button(index).await,
                Err(_) => println!("usage: trigger <index>"),
            },
            ["camera", action] => run_camera_command(&camera, action).await,
            ["camera"] => {
                println!("camera commands: center tilt zoom-in zoom-out down palette");
            }
            ["quit"] | ["exit"] => break,
            _ => println!("unrecognized command, type 'help'"),
        }
    }

    Ok(())
}

async fn run_camera_command(camera: &CameraController<UdpCameraLink>, action: &str) {
    let result = match action {
        "center" => camera.center().await,
        "tilt" => camera.center_tilt_only().await,
        "zoom-in" => camera.zoom_in().await,
        "zoom-out" => camera.zoom_out().await,
        "down" => camera.send_vert_command().await,
        "palette" => {
            let result = camera.cycle_palette().await;
            if result.is_ok() {
                println!("next palette: {}", camera.current_palette_name().await);
            }
            result
        }
        _ => {
            println!("camera commands: center tilt zoom-in zoom-out down palette");
            return;
        }
    };

    if let Err(err) = result {
        error!("panel: camera command failed: {err:#}");
    }
}

fn print_help() {
    println!("commands:");
    println!("  list");
    println!("  add <name> <servo-output> <pulse-width>");
    println!("  update <index> <name> <servo-output> <pulse-width>");
    println!("  remove <index>");
    println!("  trigger <index>");
    println!("  camera <center|tilt|zoom-in|zoom-out|down|palette>");
    println!("  quit");
}
