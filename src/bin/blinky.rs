use std::process::ExitCode;
use clap::Parser;
use blinky::console::types::Cli;
use blinky::error::{AppRunError, DeviceError};
use blinky::run;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(AppRunError::DeviceError { source: DeviceError::Unsupported }) => {
            eprintln!("The selected device is not a Blinky (LED Button Service missing)");
            ExitCode::from(2)
        },
        Err(err) => {
            eprintln!("Unexpected error: {}", err);
            ExitCode::FAILURE
        },
    }
}
