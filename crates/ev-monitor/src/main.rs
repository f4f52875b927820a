//! EV Monitor - Main Entry Point

use anyhow::Context;
use ev_monitor::{init_logging, MonitorConfig, SummaryLogger};
use obd_protocol::{Elm327, ObdProtocol};
use obd_scheduler::{vehicle_for, AcquisitionScheduler, ChannelObserver, CycleRunner};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MonitorConfig::load()?;
    init_logging(&config.log)?;

    info!("=== EV Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let vehicle = vehicle_for(&config.vehicle)?;
    vehicle.validate()?;
    let protocol = match &config.protocol {
        Some(name) => name.parse::<ObdProtocol>()?,
        None => vehicle.protocol(),
    };
    info!("Monitoring {} over {:?}", vehicle.name(), protocol);

    let session = Elm327::open(&config.link)
        .with_context(|| format!("opening adapter on {}", config.link.device))?;
    session.select_protocol(protocol)?;
    if let Some(volts) = config.voltage_calibration {
        session.calibrate_supply_voltage(volts)?;
    }

    // No fix source here; location keys stay unknown
    let runner = CycleRunner::new(vehicle, Arc::new(session), &config.scheduler);
    let scheduler = Arc::new(AcquisitionScheduler::new(runner, &config.scheduler));
    scheduler.register(SummaryLogger);
    let (channel, mut records) = ChannelObserver::channel(config.channel_capacity);
    scheduler.register(channel);

    // Records as JSON lines on stdout
    let output = tokio::spawn(async move {
        while let Some(record) = records.recv().await {
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!("Failed to encode record: {}", e),
            }
        }
    });

    scheduler.start()?;
    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    let stopping = scheduler.clone();
    tokio::task::spawn_blocking(move || stopping.stop()).await?;
    drop(scheduler);
    output.await?;

    info!("EV Monitor stopped");
    Ok(())
}
