// src/config.rs
//! Session configuration stored as JSON under the user's config directory

use crate::{
    command::DEFAULT_ACK_TIMEOUT,
    error::{GpsError, Result},
    port::{buffer::BUFFER_CAPACITY, buffer::MAX_LINE_LEN, serial::DEFAULT_BAUD_RATE},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

/// Legacy key file naming the receiver's device
pub const DEFAULT_PORT_FILE: &str = "/etc/NMEAPORT";

const PORT_KEY: &str = "NMEA_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    /// Device path; when unset it is read from `port_file`
    pub serial_port: Option<String>,
    pub port_file: PathBuf,
    pub baud_rate: u32,
    pub read_timeout_ms: u64,
    pub reopen_interval_ms: u64,
    pub max_reopen_attempts: u32,
    pub ack_timeout_ms: u64,
    /// How long `start` waits for the reader to open the port
    pub open_wait_ms: u64,
    pub buffer_capacity: usize,
    pub max_line_len: usize,
    /// Drop a partial fix that has not completed within this window
    pub fix_stale_after_ms: Option<u64>,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            serial_port: None,
            port_file: PathBuf::from(DEFAULT_PORT_FILE),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 1000,
            reopen_interval_ms: 2000,
            max_reopen_attempts: 3,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT.as_millis() as u64,
            open_wait_ms: 5000,
            buffer_capacity: BUFFER_CAPACITY,
            max_line_len: MAX_LINE_LEN,
            fix_stale_after_ms: None,
        }
    }
}

impl GpsConfig {
    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| GpsError::Config("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-session")
            .join("config.json"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(GpsError::Config("baud_rate must be non-zero".to_string()));
        }
        if self.max_line_len == 0 {
            return Err(GpsError::Config("max_line_len must be non-zero".to_string()));
        }
        if self.buffer_capacity < self.max_line_len + 2 {
            return Err(GpsError::Config(format!(
                "buffer_capacity {} cannot hold a {} byte line",
                self.buffer_capacity, self.max_line_len
            )));
        }
        if self.read_timeout_ms == 0 {
            return Err(GpsError::Config("read_timeout_ms must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The device to open: `serial_port` if set, otherwise the key file
    pub fn resolve_port(&self) -> Result<String> {
        if let Some(port) = self.serial_port.as_deref().filter(|p| !p.is_empty()) {
            return Ok(port.to_string());
        }
        read_port_file(&self.port_file)
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baud_rate: u32) {
        self.serial_port = Some(port);
        self.baud_rate = baud_rate;
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn reopen_interval(&self) -> Duration {
        Duration::from_millis(self.reopen_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn open_wait(&self) -> Duration {
        Duration::from_millis(self.open_wait_ms)
    }

    pub fn fix_stale_after(&self) -> Option<Duration> {
        self.fix_stale_after_ms.map(Duration::from_millis)
    }
}

/// Read the device path from a `NMEA_PORT=<path>` key file
pub fn read_port_file(path: &Path) -> Result<String> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        GpsError::TransportUnavailable(format!("cannot read {}: {}", path.display(), e))
    })?;
    parse_port_file(&contents).ok_or_else(|| {
        GpsError::TransportUnavailable(format!("no {} entry in {}", PORT_KEY, path.display()))
    })
}

/// First non-empty `NMEA_PORT` value in the file contents
pub fn parse_port_file(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let (key, value) = line.split_once('=')?;
        if key.trim() != PORT_KEY {
            return None;
        }
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
