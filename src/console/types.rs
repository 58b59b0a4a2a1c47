use std::path::PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

use crate::device::types::{DeviceSelector, Led};

#[derive(Debug, Parser)]
#[command(name = "blinky", version, about = "Control the LEDs and watch the buttons of a Nordic Blinky")]
pub struct Cli {
    /// Path to the config file (defaults to blinky.json next to the executable, or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List nearby Blinky peripherals
    Scan {
        /// How long to scan, overrides scanTimeoutMs from the config
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Connect and print LED / button changes until interrupted
    Watch {
        /// Bluetooth address or advertised name; the first Blinky found if omitted
        device: Option<DeviceSelector>,
    },
    /// Turn one of the LEDs on or off
    Led {
        /// Bluetooth address or advertised name; the first Blinky found if omitted
        #[arg(long, short)]
        device: Option<DeviceSelector>,

        #[arg(value_enum)]
        which: LedArg,

        #[arg(value_enum)]
        state: LedState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LedArg {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<LedArg> for Led {
    fn from(arg: LedArg) -> Self {
        match arg {
            LedArg::One => Led::Led1,
            LedArg::Two => Led::Led2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LedState {
    On,
    Off,
}

impl From<LedState> for bool {
    fn from(state: LedState) -> Self {
        state == LedState::On
    }
}
