//! Transport endpoints
//!
//! The engine only needs an ordered, reliable byte stream. VISCA cameras
//! expose one either as a TCP port or as an RS-232/422 serial line.

use serde::{Deserialize, Serialize};
use serialport::{SerialPortInfo, SerialPortType};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;
use tracing::debug;

use super::{ViscaError, DEFAULT_SERIAL_BAUD, DEFAULT_TCP_PORT};

/// Any byte stream the session can own
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> Transport for T {}

fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}

fn default_baud_rate() -> u32 {
    DEFAULT_SERIAL_BAUD
}

/// Where the camera is reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Endpoint {
    /// VISCA over IP
    Tcp {
        /// Camera host name or address
        host: String,
        /// Defaults to 5678
        #[serde(default = "default_tcp_port")]
        port: u16,
    },
    /// RS-232/422 line
    Serial {
        /// Device path or COM name
        path: String,
        /// Defaults to 9600
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
}

impl Endpoint {
    /// TCP endpoint on the default port
    pub fn tcp(host: impl Into<String>) -> Self {
        Endpoint::Tcp {
            host: host.into(),
            port: DEFAULT_TCP_PORT,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::tcp("127.0.0.1")
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Serial { path, baud_rate } => write!(f, "{}@{}", path, baud_rate),
        }
    }
}

/// Open the endpoint, giving up after `timeout`
pub async fn open(endpoint: &Endpoint, timeout: Duration) -> Result<Box<dyn Transport>, ViscaError> {
    match endpoint {
        Endpoint::Tcp { host, port } => {
            let stream = tokio::time::timeout(timeout, TcpStream::connect((host.as_str(), *port)))
                .await
                .map_err(|_| ViscaError::Timeout)??;
            stream.set_nodelay(true)?;
            debug!(%endpoint, "tcp connected");
            Ok(Box::new(stream))
        }
        Endpoint::Serial { path, baud_rate } => {
            // VISCA lines are 8N1 without flow control
            let port = tokio_serial::new(path, *baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(timeout)
                .open_native_async()
                .map_err(|e| ViscaError::SerialError(e.to_string()))?;
            debug!(%endpoint, "serial port opened");
            Ok(Box::new(port))
        }
    }
}

/// A serial port a camera might be attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,
    /// USB product string, if the port is a USB adapter
    pub product: Option<String>,
    /// USB serial number, if reported
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb) => (usb.product, usb.serial_number),
            _ => (None, None),
        };
        Self {
            name: info.port_name,
            product,
            serial_number,
        }
    }
}

/// USB-serial adapters first, numerically, then everything else by name
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (1, "ttyACM"), (2, "COM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List serial ports in a stable order
pub fn list_serial_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports.dedup_by(|a, b| a.name == b.name);
    ports
}
