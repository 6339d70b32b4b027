use crate::handlers::HandlerConfig;
use crate::shield::{RetryPolicy, ShieldError, VernierShield};
use crate::transport::{read_line, SerialTransport, Transport};
use std::thread;
use std::time::Duration;

/// Greeting the firmware prints once it has finished booting.
pub const BOOT_MESSAGE: &str = "*HELLO*";

/// The shield firmware only talks at this rate.
pub const BAUD_RATE: u32 = 115_200;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("Shield error: {0}")]
    Shield(#[from] ShieldError),
}

/// Whether the boot greeting was seen after opening the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Ready,
    /// No greeting within the allotted polls. The link is open and may still
    /// work; whether to carry on is up to the caller.
    NotReady,
}

impl LinkState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Everything needed to open a shield link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Read timeout of the serial port.
    pub timeout: Duration,
    /// Opening the port resets the board; wait this long before looking for
    /// the greeting.
    pub settle_time: Duration,
    pub boot_attempts: u32,
    pub boot_interval: Duration,
    pub retry: RetryPolicy,
}

impl ShieldSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.settle_time = timeout;
        self
    }
}

impl Default for ShieldSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: BAUD_RATE,
            timeout: Duration::from_secs(2),
            settle_time: Duration::from_secs(2),
            boot_attempts: 5,
            boot_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// Poll `transport` for the boot greeting.
///
/// Each attempt checks whether at least a greeting's worth of bytes is
/// waiting; if so one line is read and searched for [`BOOT_MESSAGE`].
pub fn await_boot_message<T: Transport + ?Sized>(
    transport: &mut T,
    attempts: u32,
    interval: Duration,
) -> Result<LinkState, ShieldError> {
    for attempt in 1..=attempts {
        if transport.bytes_to_read()? >= BOOT_MESSAGE.len() {
            let line = read_line(transport)?;
            let line = String::from_utf8_lossy(&line);
            if line.contains(BOOT_MESSAGE) {
                log::info!("{} - link ready", line.trim_end());
                return Ok(LinkState::Ready);
            }
            log::debug!("Ignoring pre-boot output: {:?}", line);
        }
        log::debug!("Waiting for shield to boot ({}/{})", attempt, attempts);
        thread::sleep(interval);
    }
    log::info!("Timed out waiting for {}", BOOT_MESSAGE);
    Ok(LinkState::NotReady)
}

pub struct ShieldConnector;

impl ShieldConnector {
    /// Open the serial link and wait for the shield to boot.
    pub fn connect(
        settings: &ShieldSettings,
        handlers: HandlerConfig,
    ) -> Result<(VernierShield<SerialTransport>, LinkState), ConnectorError> {
        log::debug!("Connecting to shield on port {}", settings.port);
        let mut transport =
            SerialTransport::open(&settings.port, settings.baud_rate, settings.timeout)?;

        thread::sleep(settings.settle_time);
        let link = await_boot_message(
            &mut transport,
            settings.boot_attempts,
            settings.boot_interval,
        )?;

        let shield = VernierShield::new(transport, handlers).with_retry_policy(settings.retry);
        Ok((shield, link))
    }

    /// Connect, run `f`, and close the link whether `f` succeeds or not.
    pub fn with_shield<R, E>(
        settings: &ShieldSettings,
        handlers: HandlerConfig,
        f: impl FnOnce(&mut VernierShield<SerialTransport>, LinkState) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<ConnectorError>,
    {
        let (mut shield, link) = Self::connect(settings, handlers)?;
        let result = f(&mut shield, link);
        shield.close();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    #[test]
    fn test_boot_message_seen() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"*HELLO*\r\n");

        let link = await_boot_message(&mut transport, 5, Duration::ZERO).unwrap();
        assert!(link.is_ready());
        assert!(transport.is_drained());
    }

    #[test]
    fn test_boot_skips_reset_noise() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"\x00\xffgarbage\r\n*HELLO*\r\n");

        let link = await_boot_message(&mut transport, 5, Duration::ZERO).unwrap();
        assert_eq!(link, LinkState::Ready);
    }

    #[test]
    fn test_boot_times_out_without_error() {
        let mut transport = ScriptedTransport::new();
        transport.push(b"*HEL");

        let link = await_boot_message(&mut transport, 5, Duration::ZERO).unwrap();
        assert_eq!(link, LinkState::NotReady);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ShieldSettings::new("/dev/ttyUSB1").with_timeout(Duration::from_secs(1));
        assert_eq!(settings.port, "/dev/ttyUSB1");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.settle_time, Duration::from_secs(1));
        assert_eq!(settings.boot_attempts, 5);
        assert_eq!(settings.retry, RetryPolicy::default());
    }

    #[test]
    fn test_connect_to_missing_port() {
        let settings = ShieldSettings::new("/dev/this-port-does-not-exist");
        match ShieldConnector::connect(&settings, HandlerConfig::default()) {
            Err(ConnectorError::SerialPort(_)) => {}
            Err(e) => panic!("Unexpected error: {:?}", e),
            Ok(_) => panic!("Opened a port that should not exist"),
        }
    }
}
