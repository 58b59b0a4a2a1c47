use std::fmt;
use std::str::FromStr;
use btleplug::api::BDAddr;
use serde::{Deserialize, Serialize};

use crate::device::constants::{CONNECT_RETRIES, CONNECT_RETRY_DELAY, CONNECT_TIMEOUT};

/// Lifecycle of the link to a single peripheral, as seen by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Disconnecting,
}

/// What a front end shows to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkyState {
    Loading,
    Ready,
    NotAvailable,
}

impl From<ConnectionState> for BlinkyState {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connecting | ConnectionState::Initializing => BlinkyState::Loading,
            ConnectionState::Ready => BlinkyState::Ready,
            ConnectionState::Disconnecting | ConnectionState::Disconnected => BlinkyState::NotAvailable,
        }
    }
}

impl fmt::Display for BlinkyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            BlinkyState::Loading => "Loading",
            BlinkyState::Ready => "Ready",
            BlinkyState::NotAvailable => "Not available",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Led {
    Led1,
    Led2,
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Led::Led1 => write!(f, "LED 1"),
            Led::Led2 => write!(f, "LED 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Button1,
    Button2,
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Button1 => write!(f, "Button 1"),
            Button::Button2 => write!(f, "Button 2"),
        }
    }
}

/// How a session establishes its link.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectOptions {
    pub auto_connect: bool,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            auto_connect: false,
            retries: CONNECT_RETRIES,
            retry_delay_ms: CONNECT_RETRY_DELAY,
            timeout_ms: CONNECT_TIMEOUT,
        }
    }
}

/// Which peripheral the scanner should pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Any,
    Address(BDAddr),
    Name(String),
}

impl DeviceSelector {
    pub fn matches(&self, address: &BDAddr, local_name: Option<&str>) -> bool {
        match self {
            DeviceSelector::Any => true,
            DeviceSelector::Address(wanted) => wanted == address,
            DeviceSelector::Name(wanted) => local_name == Some(wanted.as_str()),
        }
    }
}

impl FromStr for DeviceSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match BDAddr::from_str(s) {
            Ok(address) => Ok(DeviceSelector::Address(address)),
            Err(_) => Ok(DeviceSelector::Name(s.to_string())),
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Any => write!(f, "any Blinky"),
            DeviceSelector::Address(address) => write!(f, "{}", address),
            DeviceSelector::Name(name) => write!(f, "\"{}\"", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_state_projection() {
        assert_eq!(BlinkyState::from(ConnectionState::Connecting), BlinkyState::Loading);
        assert_eq!(BlinkyState::from(ConnectionState::Initializing), BlinkyState::Loading);
        assert_eq!(BlinkyState::from(ConnectionState::Ready), BlinkyState::Ready);
        assert_eq!(BlinkyState::from(ConnectionState::Disconnecting), BlinkyState::NotAvailable);
        assert_eq!(BlinkyState::from(ConnectionState::Disconnected), BlinkyState::NotAvailable);
    }

    #[test]
    fn selector_parses_addresses_and_names() {
        let selector: DeviceSelector = "D1:2C:3A:4B:5C:6D".parse().unwrap();
        assert_eq!(selector, DeviceSelector::Address(BDAddr::from([0xD1, 0x2C, 0x3A, 0x4B, 0x5C, 0x6D])));

        let selector: DeviceSelector = "Nordic_Blinky".parse().unwrap();
        assert_eq!(selector, DeviceSelector::Name("Nordic_Blinky".to_string()));
    }

    #[test]
    fn selector_matching() {
        let address = BDAddr::from([1, 2, 3, 4, 5, 6]);
        assert!(DeviceSelector::Any.matches(&address, None));
        assert!(DeviceSelector::Address(address).matches(&address, Some("x")));
        assert!(!DeviceSelector::Address(BDAddr::default()).matches(&address, None));
        assert!(DeviceSelector::Name("Nordic_Blinky".into()).matches(&address, Some("Nordic_Blinky")));
        assert!(!DeviceSelector::Name("Nordic_Blinky".into()).matches(&address, None));
    }

    #[test]
    fn default_connect_options() {
        let options = ConnectOptions::default();
        assert!(!options.auto_connect);
        assert_eq!(options.retries, 3);
        assert_eq!(options.retry_delay_ms, 300);
        assert_eq!(options.timeout_ms, 3000);
    }
}
