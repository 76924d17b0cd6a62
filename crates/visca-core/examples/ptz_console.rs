//! Interactive PTZ console
//!
//! Drives a VISCA camera from stdin, one command per line.
//!
//! Usage:
//!   cargo run --example ptz_console -- [OPTIONS]
//!
//! Options:
//!   --host HOST       Camera address for VISCA over IP (default: 127.0.0.1)
//!   --port PORT       TCP port (default: 5678)
//!   --serial PATH     Use a serial line instead of TCP
//!   --baud RATE       Serial baud rate (default: 9600)
//!   --config FILE     Load a JSON session config
//!
//! Set RUST_LOG=visca_core=trace to see every frame.

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use visca_core::prelude::*;
use visca_core::protocol::{list_serial_ports, DEFAULT_SERIAL_BAUD, DEFAULT_TCP_PORT};

const HELP: &str = "\
commands:
  home | osd | near | far | stop
  recall N | set N | zoom N
  focus auto|manual | power on|standby
  drive up|down|left|right|up-left|up-right|down-left|down-right|stop [PAN] [TILT]
  ? zoom|focus|power|version
  raw HEX...          e.g. raw 81 01 04 3F 02 pp FF p=3
  ports | status | help | quit";

fn parse_args() -> Result<SessionConfig> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config = SessionConfig::default();
    let mut host = "127.0.0.1".to_string();
    let mut port = DEFAULT_TCP_PORT;
    let mut serial: Option<String> = None;
    let mut baud = DEFAULT_SERIAL_BAUD;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--host" => host = value.context("--host needs a value")?,
            "--port" => port = value.context("--port needs a value")?.parse()?,
            "--serial" => serial = Some(value.context("--serial needs a path")?),
            "--baud" => baud = value.context("--baud needs a value")?.parse()?,
            "--config" => {
                let path = value.context("--config needs a file")?;
                return SessionConfig::from_json_file(&path)
                    .with_context(|| format!("loading {}", path));
            }
            other => bail!("unknown option {}", other),
        }
        i += 2;
    }

    config.endpoint = match serial {
        Some(path) => Endpoint::Serial {
            path,
            baud_rate: baud,
        },
        None => Endpoint::Tcp { host, port },
    };
    Ok(config)
}

fn number(word: Option<&str>) -> Result<i64> {
    let word = word.context("missing number")?;
    let parsed = match word.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => word.parse(),
    };
    parsed.with_context(|| format!("'{}' is not a number", word))
}

async fn run_line(camera: &SessionHandle, line: &str) -> Result<()> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(());
    };

    let (command, options) = match verb {
        "home" => (commands::pan_tilt_home(), Options::new()),
        "osd" => (commands::osd_close(), Options::new()),
        "near" => (commands::focus_near(), Options::new()),
        "far" => (commands::focus_far(), Options::new()),
        "stop" => (commands::focus_stop(), Options::new()),
        "recall" => (
            commands::preset_recall(),
            Options::new().with("preset", number(words.next())?),
        ),
        "set" => (
            commands::preset_set(),
            Options::new().with("preset", number(words.next())?),
        ),
        "zoom" => (
            commands::zoom_direct(),
            Options::new().with("position", number(words.next())?),
        ),
        "focus" => (
            commands::focus_mode(),
            Options::new().with("mode", words.next().context("auto or manual?")?),
        ),
        "power" => (
            commands::power(),
            Options::new().with("state", words.next().context("on or standby?")?),
        ),
        "drive" => {
            let direction = words.next().context("which direction?")?;
            let pan = words.next().map_or(Ok(8), |w| number(Some(w)))?;
            let tilt = words.next().map_or(Ok(8), |w| number(Some(w)))?;
            (
                commands::pan_tilt_drive(),
                Options::new()
                    .with("direction", direction)
                    .with("pan_speed", pan)
                    .with("tilt_speed", tilt),
            )
        }
        "raw" => {
            let mut hex = Vec::new();
            let mut options = Options::new();
            for word in words {
                match word.split_once('=') {
                    Some((name, value)) => options.insert(name, number(Some(value))?),
                    None => hex.push(word),
                }
            }
            (Command::user_defined("raw", &hex.join(" "))?, options)
        }
        "?" => {
            let inquiry = match words.next() {
                Some("zoom") => commands::zoom_position_inquiry(),
                Some("focus") => commands::focus_mode_inquiry(),
                Some("power") => commands::power_inquiry(),
                Some("version") => commands::version_inquiry(),
                _ => bail!("inquire about zoom, focus, power or version"),
            };
            let answer = camera.send_inquiry(&inquiry).await?;
            for (name, value) in answer.iter() {
                println!("  {} = {}", name, value);
            }
            return Ok(());
        }
        "ports" => {
            for port in list_serial_ports() {
                println!("  {} {}", port.name, port.product.unwrap_or_default());
            }
            return Ok(());
        }
        "status" => {
            println!("  {:?}", camera.status());
            return Ok(());
        }
        _ => {
            println!("{}", HELP);
            return Ok(());
        }
    };

    camera.send_command(&command, &options).await?;
    println!("  {} done", command.description());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = parse_args()?;
    println!("ViscaLink {} connecting to {}", visca_core::VERSION, config.endpoint);
    let camera = Session::connect(config);

    let mut status = camera.subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            println!("  [status] {:?}", *status.borrow_and_update());
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = run_line(&camera, line).await {
            println!("  error: {:#}", e);
        }
        if let ConnectionStatus::ConnectionFailure(reason) = camera.status() {
            bail!("connection failed: {}", reason);
        }
    }

    camera.close();
    camera.closed().await;
    Ok(())
}
