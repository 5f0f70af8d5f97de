//! Device: a networked appliance reachable through the device transport.
//!
//! The set of supported families is closed: every family is a [`DeviceKind`]
//! variant, and everything the bridge may do with a device is derived from
//! the kind's [`Capabilities`]. Routing never looks at type strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::metric::MetricKind;

/// Supported device families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceKind {
    /// IR/RF remote with a temperature sensor (RM2 Pro and friends).
    Rm,
    /// IR/RF remote with temperature and humidity sensors.
    Rm4,
    /// IR-only remote without sensors.
    RmMini,
    /// Plug with power control only.
    Sp1,
    /// Plug with an energy meter.
    Sp2,
    /// Plug with an energy meter, newer firmware.
    Sp3s,
    /// Four-socket power strip.
    Mp1,
    /// Two-gang wall socket driven by state fields.
    Bg1,
    /// Environment sensor.
    A1,
    /// Curtain motor.
    Dooya,
}

impl DeviceKind {
    /// Every supported kind, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Rm,
        Self::Rm4,
        Self::RmMini,
        Self::Sp1,
        Self::Sp2,
        Self::Sp3s,
        Self::Mp1,
        Self::Bg1,
        Self::A1,
        Self::Dooya,
    ];

    /// Short lowercase name used in configuration and topic subprefixes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rm => "rm",
            Self::Rm4 => "rm4",
            Self::RmMini => "rm_mini",
            Self::Sp1 => "sp1",
            Self::Sp2 => "sp2",
            Self::Sp3s => "sp3s",
            Self::Mp1 => "mp1",
            Self::Bg1 => "bg1",
            Self::A1 => "a1",
            Self::Dooya => "dooya",
        }
    }

    /// What the bridge can do with a device of this kind.
    #[must_use]
    pub fn capabilities(self) -> Capabilities {
        use MetricKind::{Energy, Humidity, Position, Sensors, State, Temperature};

        match self {
            Self::Rm => Capabilities {
                transceiver: Some(Transceiver::IrRf),
                metrics: &[Temperature],
                ..Capabilities::NONE
            },
            Self::Rm4 => Capabilities {
                transceiver: Some(Transceiver::IrRf),
                metrics: &[Temperature, Humidity],
                ..Capabilities::NONE
            },
            Self::RmMini => Capabilities {
                transceiver: Some(Transceiver::Ir),
                ..Capabilities::NONE
            },
            Self::Sp1 => Capabilities {
                power: PowerControl::Single,
                ..Capabilities::NONE
            },
            Self::Sp2 | Self::Sp3s => Capabilities {
                power: PowerControl::Single,
                metrics: &[Energy],
                ..Capabilities::NONE
            },
            Self::Mp1 => Capabilities {
                power: PowerControl::MultiSocket { sockets: 4 },
                metrics: &[State],
                ..Capabilities::NONE
            },
            Self::Bg1 => Capabilities {
                power: PowerControl::Fields,
                metrics: &[State],
                ..Capabilities::NONE
            },
            Self::A1 => Capabilities {
                metrics: &[Sensors],
                ..Capabilities::NONE
            },
            Self::Dooya => Capabilities {
                actuator: true,
                metrics: &[Position],
                ..Capabilities::NONE
            },
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "rm" | "rm2" | "rm_pro" => Ok(Self::Rm),
            "rm4" | "rm4_pro" => Ok(Self::Rm4),
            "rm_mini" | "rm_mini3" | "rm3" => Ok(Self::RmMini),
            "sp1" => Ok(Self::Sp1),
            "sp2" => Ok(Self::Sp2),
            "sp3s" => Ok(Self::Sp3s),
            "mp1" => Ok(Self::Mp1),
            "bg1" => Ok(Self::Bg1),
            "a1" => Ok(Self::A1),
            "dooya" | "dooya_dt360e" => Ok(Self::Dooya),
            _ => Err(ValidationError::UnknownDeviceType(s.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceKind> for String {
    fn from(kind: DeviceKind) -> Self {
        kind.as_str().to_string()
    }
}

/// How a device family switches power.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerControl {
    /// No power control.
    None,
    /// One relay, switched by the `power` command.
    Single,
    /// Several numbered sockets (1-based).
    MultiSocket {
        /// Number of sockets on the strip.
        sockets: u8,
    },
    /// Relays addressed through named state fields.
    Fields,
}

impl PowerControl {
    /// State field switched by a command, for [`PowerControl::Fields`] devices.
    #[must_use]
    pub fn field_for(command: &str) -> Option<&'static str> {
        match command {
            "power" => Some("pwr"),
            "left" => Some("pwr1"),
            "right" => Some("pwr2"),
            _ => None,
        }
    }
}

/// Which signal bands a remote can capture and replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transceiver {
    /// Infrared only.
    Ir,
    /// Infrared and radio frequency.
    IrRf,
}

impl Transceiver {
    /// Whether RF learning is available.
    #[must_use]
    pub fn supports_rf(self) -> bool {
        matches!(self, Self::IrRf)
    }
}

/// The capability set of a device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Power switching.
    pub power: PowerControl,
    /// IR/RF capture and replay.
    pub transceiver: Option<Transceiver>,
    /// Positional actuator (open/close/stop/set).
    pub actuator: bool,
    /// Metrics the device can report.
    pub metrics: &'static [MetricKind],
}

impl Capabilities {
    /// A device that can do nothing.
    pub const NONE: Self = Self {
        power: PowerControl::None,
        transceiver: None,
        actuator: false,
        metrics: &[],
    };
}

/// Hardware address of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Wrap raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// The raw bytes.
    #[must_use]
    pub fn bytes(&self) -> [u8; 6] {
        self.0
    }

    /// All six bytes as lowercase hex without separators.
    #[must_use]
    pub fn compact(&self) -> String {
        hex::encode(self.0)
    }

    /// The NIC-specific half (last three bytes) as lowercase hex.
    #[must_use]
    pub fn nic(&self) -> String {
        hex::encode(&self.0[3..])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidMac(s.to_string());
        let digits: String = s
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .collect();
        let mut bytes = [0_u8; 6];
        hex::decode_to_slice(&digits, &mut bytes).map_err(|_| invalid())?;
        Ok(Self(bytes))
    }
}

/// Identity of one managed device. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Device family.
    pub kind: DeviceKind,
    /// Network address (host name or IP).
    pub host: String,
    /// Hardware address.
    pub mac: MacAddress,
}

impl DeviceHandle {
    /// Create a handle.
    #[must_use]
    pub fn new(kind: DeviceKind, host: impl Into<String>, mac: MacAddress) -> Self {
        Self {
            kind,
            host: host.into(),
            mac,
        }
    }

    /// Capabilities of this device's family.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    /// Render a topic subprefix from a format string.
    ///
    /// Supported placeholders: `{type}`, `{host}`, `{mac}`, `{mac_nic}`.
    #[must_use]
    pub fn subprefix(&self, format: &str) -> String {
        format
            .replace("{type}", self.kind.as_str())
            .replace("{host}", &self.host)
            .replace("{mac_nic}", &self.mac.nic())
            .replace("{mac}", &self.mac.compact())
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {} ({})", self.kind, self.host, self.mac)
    }
}

/// Motion commands for positional actuators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Open,
    Close,
    Stop,
}

impl Motion {
    /// Parse a lower-cased action payload.
    #[must_use]
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }
}
