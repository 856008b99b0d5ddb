use crate::serial_link::{CapturePort, DeviceError, SerialLink};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortType, StopBits};
use std::time::Duration;

/// Line rate of the capture core's UART.
pub const BAUD_RATE: u32 = 500_000;

/// Per-call read timeout. Overall deadlines are enforced by the capture loops.
const PORT_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SerialDevice {
    pub port: String,
    pub description: String,
}

impl SerialDevice {
    pub fn new(port: String, description: String) -> Self {
        Self { port, description }
    }
}

impl CapturePort for Box<dyn SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

pub struct DeviceConnector;

impl DeviceConnector {
    /// Opens `port` as 500 000 baud 8N1 without flow control and drops stale input.
    pub fn connect(port: &str) -> Result<SerialLink<Box<dyn SerialPort>>, DeviceError> {
        log::debug!("Opening logic analyzer on port {}", port);
        let open_failure = |source| DeviceError::DeviceOpenFailure {
            port: port.to_string(),
            source,
        };

        let serial = serialport::new(port, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(PORT_TIMEOUT)
            .open()
            .map_err(open_failure)?;

        serial
            .clear(serialport::ClearBuffer::Input)
            .map_err(open_failure)?;

        Ok(SerialLink::new(serial))
    }

    /// Serial ports the OS reports, USB adapters described by product name.
    pub fn available_devices() -> Result<Vec<SerialDevice>, DeviceError> {
        let ports = serialport::available_ports().map_err(|source| {
            DeviceError::DeviceOpenFailure {
                port: "<enumeration>".to_string(),
                source,
            }
        })?;

        Ok(ports
            .into_iter()
            .map(|info| {
                let description = match info.port_type {
                    SerialPortType::UsbPort(usb) => usb.product.unwrap_or_else(|| {
                        format!("USB {:04x}:{:04x}", usb.vid, usb.pid)
                    }),
                    SerialPortType::PciPort => "PCI serial port".to_string(),
                    SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
                    SerialPortType::Unknown => "Serial port".to_string(),
                };
                SerialDevice::new(info.port_name, description)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_devices() {
        // Depends on the machine; only check that whatever is listed is well formed.
        if let Ok(devices) = DeviceConnector::available_devices() {
            for device in devices {
                assert!(!device.port.is_empty());
                assert!(!device.description.is_empty());
            }
        }
    }

    #[test]
    fn test_connect_missing_port() {
        let result = DeviceConnector::connect("/dev/redtin-does-not-exist");
        assert!(matches!(
            result,
            Err(DeviceError::DeviceOpenFailure { ref port, .. }) if port == "/dev/redtin-does-not-exist"
        ));
    }
}
