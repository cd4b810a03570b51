//! btleplug-backed channel source and the one-shot connection setup.

use btleplug::api::{
    CharPropFlags, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use log::{debug, info, warn};
use tokio::time::{self, Duration};

use crate::channel::{Channel, ChannelMap};
use crate::config::DeviceConfig;
use crate::error::{ChannelReadError, SetupError};
use crate::source::ChannelSource;

pub struct BleChannelSource {
    peripheral: Peripheral,
    characteristics: [Characteristic; 4],
    read_timeout: Duration,
}

impl BleChannelSource {
    /// Scan for the configured device, connect, and resolve the four
    /// channel characteristics.
    pub async fn connect(config: &DeviceConfig, channels: &ChannelMap) -> Result<Self, SetupError> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;
        let adapter = adapters.into_iter().next().ok_or(SetupError::NoAdapter)?;

        adapter.start_scan(ScanFilter::default()).await?;
        info!("Scanning for {:?}...", config.scan_duration);
        time::sleep(config.scan_duration).await;

        let peripheral = find_by_name(&adapter, &config.device_name).await?;
        if let Err(err) = adapter.stop_scan().await {
            warn!("failed to stop scan: {err}");
        }

        let connect = async {
            peripheral.connect().await?;
            peripheral.discover_services().await?;
            Ok::<(), btleplug::Error>(())
        };
        time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| SetupError::ConnectTimeout(config.connect_timeout))??;
        info!("Connected to {}", config.device_name);

        let characteristics = resolve_characteristics(&peripheral, channels)?;

        Ok(Self {
            peripheral,
            characteristics,
            read_timeout: config.connect_timeout,
        })
    }

    pub async fn disconnect(&self) -> Result<(), SetupError> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

impl ChannelSource for BleChannelSource {
    async fn read_channel(&self, channel: Channel) -> Result<Vec<u8>, ChannelReadError> {
        let characteristic = &self.characteristics[channel.index()];
        match time::timeout(self.read_timeout, self.peripheral.read(characteristic)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(btleplug::Error::NotConnected)) => Err(ChannelReadError::Disconnected),
            Ok(Err(btleplug::Error::TimedOut(_))) => Err(ChannelReadError::Timeout),
            Ok(Err(err)) => Err(ChannelReadError::Read(err.to_string())),
            Err(_) => Err(ChannelReadError::Timeout),
        }
    }

    async fn is_connected(&self) -> bool {
        match self.peripheral.is_connected().await {
            Ok(connected) => connected,
            Err(err) => {
                warn!("connection state query failed: {err}");
                false
            }
        }
    }
}

async fn find_by_name(adapter: &Adapter, name: &str) -> Result<Peripheral, SetupError> {
    for p in adapter.peripherals().await? {
        let Some(props) = p.properties().await? else {
            continue;
        };
        let local_name = props.local_name.as_deref().unwrap_or("(unknown)");
        debug!("Found device: {} ({})", local_name, props.address);
        if local_name == name {
            return Ok(p);
        }
    }
    Err(SetupError::DeviceNotFound(name.to_string()))
}

fn resolve_characteristics(
    peripheral: &Peripheral,
    channels: &ChannelMap,
) -> Result<[Characteristic; 4], SetupError> {
    let available = peripheral.characteristics();
    for c in &available {
        debug!("Characteristic UUID: {}, properties: {:?}", c.uuid, c.properties);
    }

    let find = |channel: Channel| {
        let uuid = channels.uuid(channel);
        let characteristic = available
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(SetupError::MissingCharacteristic { channel, uuid })?;
        if !characteristic.properties.contains(CharPropFlags::READ) {
            warn!("characteristic {uuid} for channel {channel} is not marked readable");
        }
        Ok::<_, SetupError>(characteristic)
    };

    Ok([
        find(Channel::A)?,
        find(Channel::B)?,
        find(Channel::C)?,
        find(Channel::D)?,
    ])
}
