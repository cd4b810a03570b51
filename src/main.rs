use anyhow::{Context, Result, bail};
use ble_logger::{Acquisition, AcquisitionConfig, BleChannelSource, DeviceConfig};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device = DeviceConfig::from_env().context("invalid device configuration")?;
    let config = AcquisitionConfig::from_env().context("invalid acquisition configuration")?;

    for (channel, uuid) in config.channels.iter() {
        info!("Channel {channel}: characteristic {uuid}");
    }
    info!("Looking for {}", device.device_name);
    let source = BleChannelSource::connect(&device, &config.channels)
        .await
        .context("device setup failed")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("failed to listen for Ctrl-C: {err}");
                return;
            }
            info!("Stopping...");
            cancel.cancel();
        }
    });

    let mut acquisition = Acquisition::new(source, config);
    let result = acquisition.run(cancel).await;
    let report = acquisition.report().clone();
    info!(
        "Finished ({:?}): {} ticks, {} rows, {} dropped, {} overruns, {} saves ({} failed)",
        report.exit_state,
        report.ticks,
        report.rows,
        report.dropped_ticks,
        report.overruns,
        report.saves,
        report.failed_saves
    );

    if let Err(err) = acquisition.source().disconnect().await {
        warn!("disconnect failed: {err}");
    }

    result.context("acquisition ended early")?;
    if !report.final_save_ok {
        bail!(
            "final save to {} failed",
            acquisition.config().output_path.display()
        );
    }
    info!(
        "Data written to {}",
        acquisition.config().output_path.display()
    );
    Ok(())
}
