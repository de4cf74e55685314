// src/port/serial.rs
//! Serial port transport

use super::{Connector, Transport};
use crate::error::Result;
use std::{
    io::{self, Read, Write},
    time::Duration,
};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, StopBits};
use tracing::debug;

/// Baud rate the receiver talks at out of the box
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Opens raw 8N1 serial ports at a fixed baud rate
#[derive(Debug, Clone)]
pub struct SerialConnector {
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl Connector for SerialConnector {
    fn open(&self, device: &str) -> io::Result<Box<dyn Transport>> {
        debug!("Opening {} at {} baud", device, self.baud_rate);

        let timeout = Duration::from_millis(1000);
        let port = tokio_serial::new(device, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;

        Ok(Box::new(SerialTransport { port, timeout }))
    }
}

/// A blocking serial port with a per-read timeout
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl Transport for SerialTransport {
    fn read_timeout(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout)?;
            self.timeout = timeout;
        }
        self.port.read(buf)
    }

    fn writer(&self) -> io::Result<Box<dyn Write + Send>> {
        let port = self.port.try_clone()?;
        Ok(Box::new(PortWriter(port)))
    }
}

struct PortWriter(Box<dyn SerialPort>);

impl Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>> {
    Ok(tokio_serial::available_ports()?)
}
