use std::net::SocketAddr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_CAMERA_ADDRESS: &str = "192.168.144.108:5000";

const CENTER_COMMAND: &str = "#TPUG2wPTZ056F";
const CENTER_TILT_COMMAND: &str = "#TPUG2wPTZ026C";
const ZOOM_IN_COMMAND: &str = "#TPUD2wDZM0A65";
const ZOOM_OUT_COMMAND: &str = "#TPUD2wDZM0B66";
const VERT_COMMAND: &str = "#TPUG6wGAY00001012";

/// Thermal palette rotation of the C12 gimbal, in the order the camera
/// firmware cycles them. Each entry pairs the display name with the ASCII
/// command that selects it.
pub const THERMAL_PALETTES: [(&str, &str); 10] = [
    ("WHITE_HOT", "#TPUD2wIMG0147"),
    ("BLACK_HOT", "#TPUD2wIMG0B58"),
    ("SEPIA", "#TPUD2wIMG0349"),
    ("IRONBOW", "#TPUD2wIMG044A"),
    ("RAINBOW", "#TPUD2wIMG054B"),
    ("NIGHT", "#TPUD2wIMG064C"),
    ("RED_HOT", "#TPUD2wIMG084E"),
    ("JUNGLE", "#TPUD2wIMG094F"),
    ("MEDICAL", "#TPUD2wIMG0A57"),
    ("GLORY_HOT", "#TPUD2wIMG0C59"),
];

#[async_trait]
pub trait CameraLink: Send + Sync {
    async fn send_command(&self, command: &str) -> Result<()>;
}

pub struct UdpCameraLink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpCameraLink {
    pub async fn new(target: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind local udp socket for the camera link")?;
        Ok(Self { socket, target })
    }
}

#[async_trait]
impl CameraLink for UdpCameraLink {
    async fn send_command(&self, command: &str) -> Result<()> {
        let sent = self
            .socket
            .send_to(command.as_bytes(), self.target)
            .await
            .with_context(|| format!("failed to send camera command to {}", self.target))?;
        debug!("camera: sent {command} ({sent} bytes)");
        Ok(())
    }
}

/// Command surface of the C12 gimbal camera. Every operation sends one exact
/// protocol string over the link and surfaces send failures to the caller.
pub struct CameraController<L: CameraLink> {
    link: L,
    // Index of the palette the next cycle_palette call applies.
    palette_index: Mutex<usize>,
}

impl<L: CameraLink> CameraController<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            palette_index: Mutex::new(0),
        }
    }

    pub async fn center(&self) -> Result<()> {
        self.link.send_command(CENTER_COMMAND).await
    }

    pub async fn center_tilt_only(&self) -> Result<()> {
        self.link.send_command(CENTER_TILT_COMMAND).await
    }

    pub async fn zoom_in(&self) -> Result<()> {
        self.link.send_command(ZOOM_IN_COMMAND).await
    }

    pub async fn zoom_out(&self) -> Result<()> {
        self.link.send_command(ZOOM_OUT_COMMAND).await
    }

    /// Points the gimbal straight down.
    pub async fn send_vert_command(&self) -> Result<()> {
        self.link.send_command(VERT_COMMAND).await
    }

    pub async fn send_custom_command(&self, command: &str) -> Result<()> {
        self.link.send_command(command).await
    }

    /// Applies the palette at the current rotation position, then advances.
    /// The index only moves when the send succeeded, so a flaky link retries
    /// the same palette instead of skipping entries.
    pub async fn cycle_palette(&self) -> Result<()> {
        let mut index = self.palette_index.lock().await;
        let (name, command) = THERMAL_PALETTES[*index];
        debug!("camera: cycling thermal palette to {name}");
        self.link.send_command(command).await?;
        *index = (*index + 1) % THERMAL_PALETTES.len();
        Ok(())
    }

    /// Name of the palette the next [`cycle_palette`](Self::cycle_palette)
    /// call will apply.
    pub async fn current_palette_name(&self) -> &'static str {
        THERMAL_PALETTES[*self.palette_index.lock().await].0
    }
}
