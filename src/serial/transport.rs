use std::io::{Read, Write};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{SerialPort, SerialPortType};
use tokio::time::timeout;

use super::{Result, SerialDeviceInfo, SerialError};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line terminator the hub expects on command lines.
pub const LINE_TERMINATOR: &str = "\r\n";

/// Byte-level line transport to the hub. The production implementation
/// wraps a physical serial port; tests substitute scripted links.
#[async_trait]
pub trait SerialLink: Send {
    /// Write one command line; the terminator is appended here.
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one terminator-delimited line, waiting at most `deadline`.
    /// The returned line is stripped of CR/LF and may be empty.
    async fn read_line(&mut self, deadline: Duration) -> Result<String>;
}

pub struct SerialConnection {
    port: Box<dyn SerialPort>,
    /// Bytes received but not yet consumed as a full line.
    pending: Vec<u8>,
}

impl SerialConnection {
    /// Open the serial device at `path`. `read_timeout` only bounds the
    /// blocking reads on the OS handle; the per-line deadline is
    /// enforced in `read_line`.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(path, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", path, e)))?;

        log::info!("Opened serial connection on {} at {} baud", path, baud_rate);
        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// List USB serial devices that could be hubs.
    pub fn discover_devices() -> Result<Vec<SerialDeviceInfo>> {
        let ports = serialport::available_ports()?;
        let mut devices = Vec::new();

        for port in ports {
            if let SerialPortType::UsbPort(usb_info) = port.port_type {
                devices.push(SerialDeviceInfo {
                    port_name: port.port_name.clone(),
                    serial_number: usb_info.serial_number.clone(),
                    manufacturer: usb_info.manufacturer.clone(),
                    product: usb_info.product.clone(),
                });
            }
        }

        Ok(devices)
    }

    /// Resolve a hub identifier to a device path. The identifier is
    /// either the USB serial number of the hub or the device path
    /// itself.
    pub fn resolve_identifier(identifier: &str) -> Result<String> {
        let ports = serialport::available_ports()?;

        for port in ports {
            if port.port_name == identifier {
                return Ok(port.port_name);
            }
            if let SerialPortType::UsbPort(usb_info) = &port.port_type {
                if usb_info.serial_number.as_deref() == Some(identifier) {
                    return Ok(port.port_name);
                }
            }
        }

        Err(SerialError::PortNotFound(identifier.to_string()))
    }

    /// Extract the next full line from the pending buffer, if any.
    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        while matches!(line.last(), Some(b'\n') | Some(b'\r')) {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl SerialLink for SerialConnection {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let framed = format!("{}{}", line, LINE_TERMINATOR);
        self.port.write_all(framed.as_bytes()).map_err(SerialError::IoError)?;
        self.port.flush().map_err(SerialError::IoError)?;
        Ok(())
    }

    async fn read_line(&mut self, deadline: Duration) -> Result<String> {
        if let Some(line) = self.take_buffered_line() {
            return Ok(line);
        }

        let read_operation = async {
            loop {
                match self.port.bytes_to_read() {
                    Ok(0) => {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    Ok(_) => {
                        let mut buf = [0u8; 256];
                        match self.port.read(&mut buf) {
                            Ok(n) if n > 0 => {
                                self.pending.extend_from_slice(&buf[..n]);
                                if let Some(line) = self.take_buffered_line() {
                                    return Ok(line);
                                }
                            }
                            Ok(_) => {}
                            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => {}
                            Err(e) => return Err(SerialError::IoError(e)),
                        }
                    }
                    Err(e) => return Err(SerialError::SerialportError(e)),
                }
            }
        };

        timeout(deadline, read_operation)
            .await
            .map_err(|_| SerialError::Timeout)?
    }
}
