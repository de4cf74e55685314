// src/main.rs
//! gps-session - stream fixes and satellite reports from an NMEA receiver

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use gps_session::{
    logging, port::serial::list_serial_ports, GpsCallbacks, GpsConfig, GpsLocation, GpsMonitor,
    GpsStatus, SvStatus,
};
use serde_json::json;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gps-session", version)]
#[command(about = "Drive a serial NMEA GPS receiver and print its fixes")]
struct Args {
    /// Serial device, overrides the config file and /etc/NMEAPORT
    #[arg(short, long)]
    port: Option<String>,

    #[arg(short, long)]
    baud: Option<u32>,

    /// Config file (default: ~/.config/gps-session/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print one JSON object per line instead of text
    #[arg(long)]
    json: bool,

    /// Also print every recognized NMEA sentence
    #[arg(long)]
    raw: bool,

    /// List serial ports and exit
    #[arg(long)]
    list_ports: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

struct ConsoleCallbacks {
    json: bool,
    raw: bool,
}

impl GpsCallbacks for ConsoleCallbacks {
    fn on_fix(&self, fix: &GpsLocation) {
        if self.json {
            println!("{}", json!({ "type": "fix", "fix": fix, "time": fix.time() }));
            return;
        }
        let time = fix
            .time()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "Fix {}  lat {:>11.6}°  lon {:>11.6}°  alt {:>7.1} m  speed {:>6.2} m/s  course {:>5.1}°  acc {:>4.1}",
            time,
            fix.latitude,
            fix.longitude,
            fix.altitude,
            fix.speed,
            fix.bearing,
            fix.accuracy
        );
    }

    fn on_satellite_status(&self, status: &SvStatus) {
        if self.json {
            println!(
                "{}",
                json!({
                    "type": "satellites",
                    "in_view": status.num_svs,
                    "used_mask": status.used_in_fix_mask,
                    "satellites": status.visible(),
                })
            );
            return;
        }
        println!(
            "Satellites: {} in view, {} used",
            status.num_svs,
            status.satellites_used()
        );
        for sv in status.visible() {
            println!(
                "  {:>7} {:>3}  el {:>4.0}°  az {:>5.0}°  snr {:>4.1} ({}){}",
                sv.constellation(),
                sv.prn,
                sv.elevation,
                sv.azimuth,
                sv.snr,
                sv.signal_strength_description(),
                if status.is_used(sv.prn) { "  *" } else { "" }
            );
        }
    }

    fn on_raw_sentence(&self, received: DateTime<Utc>, sentence: &str) {
        if !self.raw {
            return;
        }
        if self.json {
            println!("{}", json!({ "type": "nmea", "received": received, "sentence": sentence }));
        } else {
            println!("{} {}", received.format("%H:%M:%S%.3f"), sentence);
        }
    }

    fn on_status_change(&self, status: GpsStatus) {
        if self.json {
            println!("{}", json!({ "type": "status", "status": status }));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    if args.list_ports {
        let ports = list_serial_ports()?;
        if ports.is_empty() {
            println!("No serial ports found.");
        } else {
            println!("Available serial ports:");
            for port in ports {
                println!("  {} - {:?}", port.port_name, port.port_type);
            }
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => GpsConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => GpsConfig::load().unwrap_or_else(|e| {
            warn!("Using default configuration: {}", e);
            GpsConfig::default()
        }),
    };
    if let Some(port) = args.port {
        let baud = args.baud.unwrap_or(config.baud_rate);
        config.update_serial(port, baud);
    } else if let Some(baud) = args.baud {
        config.baud_rate = baud;
    }

    let monitor = Arc::new(GpsMonitor::with_serial(config));
    let callbacks = Arc::new(ConsoleCallbacks {
        json: args.json,
        raw: args.raw,
    });

    let m = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || -> gps_session::Result<()> {
        m.init(callbacks)?;
        m.start()
    })
    .await?
    .context("starting GPS session")?;
    info!("GPS session running, Ctrl+C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
            _ = ticker.tick() => {
                if !monitor.is_running() {
                    warn!("GPS session ended");
                    break;
                }
            }
        }
    }

    let m = Arc::clone(&monitor);
    tokio::task::spawn_blocking(move || {
        if m.is_running() {
            if let Err(e) = m.stop() {
                warn!("Stopping receiver failed: {}", e);
            }
        }
        m.cleanup();
    })
    .await?;

    Ok(())
}
