use std::{path::Path, path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    connection::{SendOptions, Settings},
    error::Error,
    mock::{MockBehaviour, MockDevice},
    serial::{codecs::Framing, SerialPort, SerialPortBuilder},
    transport::Transport,
};

/// The default port to run the HTTP server on.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// The device the server talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    /// A tty/COM port.
    Tty {
        /// Likely "/dev/ttyACMx" or "COMx".
        path: String,

        /// The baud rate.
        baud: u32,

        /// Hardware or software flow control.
        /// None if omitted.
        #[serde(default)]
        flow_control: Option<serialport::FlowControl>,
    },

    /// An in-memory device.
    Mock {
        /// Shows up in logs.
        name: String,

        /// What the device does with what it receives.
        behaviour: MockBehaviour,

        /// How long the device takes to reply, in milliseconds.
        delay_ms: u64,
    },
}

impl Default for Device {
    fn default() -> Self {
        Self::Mock {
            name: "mock".into(),
            behaviour: MockBehaviour::Echo,
            delay_ms: 0,
        }
    }
}

fn tty(path: &str, baud: u32, flow_control: Option<serialport::FlowControl>) -> SerialPort {
    let builder = SerialPortBuilder::new(path).set_baud(baud);

    match flow_control {
        Some(flow_control) => builder.set_flow_control(flow_control),
        None => builder,
    }
    .build()
}

impl Device {
    /// Build the transport for this device.
    pub fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Device::Tty {
                path,
                baud,
                flow_control,
            } => Arc::new(tty(path, *baud, *flow_control)),
            Device::Mock {
                name,
                behaviour,
                delay_ms,
            } => Arc::new(
                MockDevice::new(name, *behaviour).with_delay(Duration::from_millis(*delay_ms)),
            ),
        }
    }
}

/// The configuration used for running the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which device to use.
    pub device: Device,

    /// Which port the HTTP server listens on.
    pub http_port: u16,

    /// How long blocking requests wait if the request does not say, in milliseconds.
    pub timeout_ms: u64,

    /// The least amount of time between two sends, in milliseconds.
    pub send_interval_ms: u64,

    /// Appended to sent data if the request does not say.
    pub ending: String,

    /// Put between sent fields if the request does not say.
    pub concatenate: String,

    /// How incoming bytes are cut into records.
    pub framing: Framing,

    /// If set, logs are also written to daily rotated files in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        let options = SendOptions::default();

        Self {
            device: Device::default(),
            http_port: DEFAULT_HTTP_PORT,
            timeout_ms: settings.timeout.as_millis() as u64,
            send_interval_ms: settings.send_interval.as_millis() as u64,
            ending: options.ending,
            concatenate: options.concatenate,
            framing: settings.framing,
            log_dir: None,
        }
    }
}

impl Config {
    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        Self::ron()
            .from_str::<Config>(input)
            .map_err(|e| Error::BadConfig(format!("Not valid RON: {e}")))
    }

    /// An example configuration with some fields filled in.
    pub fn example() -> Self {
        Self {
            device: Device::Tty {
                path: "/dev/ttyUSB0".into(),
                baud: 115_200,
                flow_control: None,
            },
            framing: Framing::Lines { delimiter: '\n' },
            log_dir: Some("logs".into()),
            ..Default::default()
        }
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .unwrap_or_else(|e| format!("Could not serialize config: {e}"))
    }

    /// Setup a new configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s = std::fs::read_to_string(p.as_ref()).map_err(|e| {
            Error::BadConfig(format!("Could not read {:?}: {e}", p.as_ref()))
        })?;

        Self::deserialize(&s)
    }

    /// The connection settings this configuration describes.
    pub fn settings(&self) -> Settings {
        Settings {
            timeout: Duration::from_millis(self.timeout_ms),
            send_interval: Duration::from_millis(self.send_interval_ms),
            framing: self.framing,
        }
    }

    /// The send options used when a request does not say.
    pub fn send_options(&self) -> SendOptions {
        SendOptions {
            ending: self.ending.clone(),
            concatenate: self.concatenate.clone(),
        }
    }

    fn check_timeout(&self) -> Result<(), Error> {
        if self.timeout_ms == 0 {
            return Err(Error::BadConfig(
                "The timeout must be positive, otherwise nothing can ever be waited for.".into(),
            ));
        }

        Ok(())
    }

    fn check_ending(&self) -> Result<(), Error> {
        if self.ending.is_empty() {
            return Err(Error::BadConfig(
                "The ending must not be empty, the device would not know where a send stops.".into(),
            ));
        }

        Ok(())
    }

    fn check_framing(&self) -> Result<(), Error> {
        match self.framing {
            Framing::Lines { delimiter } if !delimiter.is_ascii() => Err(Error::BadConfig(format!(
                "Line delimiters must be a single ascii character, got `{delimiter}`."
            ))),
            _ => Ok(()),
        }
    }

    fn check_device(&self) -> Result<(), Error> {
        match &self.device {
            Device::Tty { path, .. } if path.is_empty() => {
                Err(Error::BadConfig("The tty path is empty.".into()))
            }
            Device::Tty { baud: 0, path, .. } => Err(Error::BadConfig(format!(
                "The baud rate of `{path}` must be positive."
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        self.check_timeout()?;
        self.check_ending()?;
        self.check_framing()?;
        self.check_device()?;

        Ok(())
    }
}
