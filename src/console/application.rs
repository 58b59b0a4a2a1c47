use std::future::Future;
use std::sync::Arc;
use btleplug::platform::Manager;
use log::{info, warn};
use tokio::time::{sleep, Duration};

use crate::config::types::Config;
use crate::console::types::{Cli, Command};
use crate::device::connection::{find_blinky, scan_blinkies, BtleTransport};
use crate::device::logged::LoggedSession;
use crate::device::session::DeviceSession;
use crate::device::transport::Transport;
use crate::device::types::{BlinkyState, DeviceSelector, Led};
use crate::error::{AppRunError, DeviceError};

/**
 * How long (milliseconds) to wait before reconnecting after the link was lost.
 */
pub const RECONNECT_DELAY: u64 = 1000;

#[derive(Debug)]
pub enum Reconnect {
    Connected,
    /// `stop` completed first.
    Stopped,
    /// Trying again would not help.
    Failed(DeviceError),
}

/// Keeps reconnecting `session`, `RECONNECT_DELAY` apart, until it is ready again.
///
/// `stop` is raced against every delay and every attempt, so it interrupts the loop at any point.
pub async fn reconnect<T, F>(session: &LoggedSession<T>, stop: F) -> Reconnect
where
    T: Transport,
    F: Future,
{
    tokio::pin!(stop);

    loop {
        let attempt = async {
            sleep(Duration::from_millis(RECONNECT_DELAY)).await;
            session.connect().await
        };

        tokio::select! {
            _ = &mut stop => return Reconnect::Stopped,
            result = attempt => match result {
                Ok(()) => return Reconnect::Connected,
                Err(err) if err.is_permanent() => return Reconnect::Failed(err),
                Err(err) => warn!("Reconnecting failed: {}", err),
            },
        }
    }
}

fn on_off(state: bool) -> &'static str {
    if state { "ON" } else { "OFF" }
}

async fn open_session(manager: &Manager, config: &Config, selector: &DeviceSelector) -> Result<LoggedSession<BtleTransport>, DeviceError> {
    info!("Looking for {}...", selector);
    let found = find_blinky(manager, selector, Duration::from_millis(config.scan_timeout_ms)).await?;
    let label = found.label();

    let session = DeviceSession::new(Arc::new(BtleTransport::from(found)), config.connect);
    Ok(LoggedSession::new(session, label))
}

async fn scan(manager: &Manager, scan_timeout: Duration) -> Result<(), AppRunError> {
    println!("Scanning for {}...", humantime::format_duration(scan_timeout));
    let found = scan_blinkies(manager, scan_timeout).await?;

    if found.is_empty() {
        println!("No Blinky found");
    }

    for found in found {
        let rssi = found.properties.rssi.map(|rssi| format!("{} dBm", rssi)).unwrap_or_else(|| "? dBm".to_string());
        println!("{}  {}", found.label(), rssi);
    }

    Ok(())
}

async fn set_led(manager: &Manager, config: &Config, selector: &DeviceSelector, led: Led, state: bool) -> Result<(), AppRunError> {
    let mut session = open_session(manager, config, selector).await?;

    let result = async {
        session.connect().await?;
        session.set_led(led, state).await
    }.await;

    session.release().await;
    result?;

    println!("{} turned {}", led, on_off(state));
    Ok(())
}

async fn watch(manager: &Manager, config: &Config, selector: &DeviceSelector) -> Result<(), AppRunError> {
    let mut session = open_session(manager, config, selector).await?;

    if let Err(err) = session.connect().await {
        session.release().await;
        return Err(err.into());
    }

    println!("Connected to {}, press Ctrl-C to stop", session.device());

    let mut state = session.state();
    let mut led1 = session.led1();
    let mut led2 = session.led2();
    let mut button1 = session.button1();
    let mut button2 = session.button2();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = 'mainloop: loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                break 'mainloop Ok(());
            },
            Ok(()) = state.changed() => {
                let current = *state.borrow_and_update();
                println!("State: {}", current);

                if current != BlinkyState::NotAvailable {
                    continue;
                }

                match reconnect(&session, &mut ctrl_c).await {
                    Reconnect::Connected => {},
                    Reconnect::Stopped => break 'mainloop Ok(()),
                    Reconnect::Failed(err) => break 'mainloop Err(err),
                }
            },
            Ok(()) = led1.changed() => println!("LED 1: {}", on_off(*led1.borrow_and_update())),
            Ok(()) = led2.changed() => println!("LED 2: {}", on_off(*led2.borrow_and_update())),
            Ok(()) = button1.changed() => println!("Button 1: {}", if *button1.borrow_and_update() { "pressed" } else { "released" }),
            Ok(()) = button2.changed() => println!("Button 2: {}", if *button2.borrow_and_update() { "pressed" } else { "released" }),
            else => break 'mainloop Ok(()),
        }
    };

    session.release().await;
    Ok(result?)
}

pub async fn run_application(cli: Cli, config: Config) -> Result<(), AppRunError> {
    let manager = Manager::new().await.map_err(DeviceError::from)?;

    match cli.command {
        Command::Scan { timeout_ms } => {
            let scan_timeout = Duration::from_millis(timeout_ms.unwrap_or(config.scan_timeout_ms));
            scan(&manager, scan_timeout).await
        },
        Command::Watch { device } => {
            watch(&manager, &config, &device.unwrap_or(DeviceSelector::Any)).await
        },
        Command::Led { device, which, state } => {
            set_led(&manager, &config, &device.unwrap_or(DeviceSelector::Any), which.into(), state.into()).await
        },
    }
}
