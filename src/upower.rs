//! UPower transport: battery discovery and the property-change producer.
//!
//! Owns the battery side of the bus. Discovery enumerates UPower devices and
//! insists on exactly one battery; the monitor task seeds the inbox with one
//! full property snapshot, then forwards every `PropertiesChanged` delta.

use crate::error::DiscoveryError;
use crate::event::{BatteryUpdate, Event};
use futures::StreamExt;
use std::collections::HashMap;
use std::io::Write;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use zbus::names::InterfaceName;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{proxy, Connection};

/// UPower device type for batteries.
const BATTERY_DEVICE_TYPE: u32 = 2;

const UPOWER_SERVICE: &str = "org.freedesktop.UPower";
const DEVICE_INTERFACE: &str = "org.freedesktop.UPower.Device";

#[proxy(
    interface = "org.freedesktop.UPower",
    default_service = "org.freedesktop.UPower",
    default_path = "/org/freedesktop/UPower"
)]
trait UPower {
    fn enumerate_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;
}

#[proxy(
    interface = "org.freedesktop.UPower.Device",
    default_service = "org.freedesktop.UPower"
)]
trait UPowerDevice {
    #[zbus(property, name = "Type")]
    fn device_type(&self) -> zbus::Result<u32>;
}

/// Locate the single battery device, reporting every find to `out`.
///
/// Zero batteries and more than one battery are both discovery errors; the
/// caller decides which of the two is fatal.
pub async fn find_battery<W: Write>(
    conn: &Connection,
    out: &mut W,
) -> Result<OwnedObjectPath, DiscoveryError> {
    let upower = UPowerProxy::new(conn).await?;
    let devices = upower.enumerate_devices().await?;

    let mut batteries = Vec::new();
    for device in devices {
        let device_proxy = UPowerDeviceProxy::builder(conn)
            .path(device.clone())?
            .build()
            .await?;
        if device_proxy.device_type().await? == BATTERY_DEVICE_TYPE {
            writeln!(out, "Found battery at {}", device.as_str())?;
            batteries.push(device);
        }
    }

    match batteries.len() {
        0 => Err(DiscoveryError::NoBattery),
        1 => Ok(batteries.remove(0)),
        count => Err(DiscoveryError::MultipleBatteries { count }),
    }
}

/// Battery property producer task.
///
/// Sends one snapshot event, then one event per property-change signal,
/// until shutdown or channel closure. Errors propagate to the caller; there
/// is no reconnection logic.
pub async fn run_battery_monitor(
    conn: Connection,
    device_path: OwnedObjectPath,
    events: mpsc::Sender<Event>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), zbus::Error> {
    let properties = zbus::fdo::PropertiesProxy::builder(&conn)
        .destination(UPOWER_SERVICE)?
        .path(device_path.clone())?
        .build()
        .await?;

    let device_interface = InterfaceName::from_static_str(DEVICE_INTERFACE)?;

    // Seed the full snapshot before subscribing to deltas, so the engine
    // sees capacity bounds and the initial charge state first.
    let snapshot = properties
        .get_all(Some(device_interface.clone()).into())
        .await?;
    let update = BatteryUpdate::from_properties(&snapshot);
    info!(device = %device_path, "seeded initial battery snapshot");
    if events.send(Event::Battery(update)).await.is_err() {
        return Ok(());
    }

    let mut changes = properties.receive_properties_changed().await?;

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("battery monitor shutting down");
                    break;
                }
            }
            signal = changes.next() => {
                let Some(signal) = signal else {
                    warn!("property-change stream ended");
                    break;
                };
                let args = signal.args()?;
                if *args.interface_name() != device_interface {
                    continue;
                }

                let changed: HashMap<String, OwnedValue> = args
                    .changed_properties()
                    .iter()
                    .filter_map(|(key, value)| {
                        Some((key.to_string(), value.try_to_owned().ok()?))
                    })
                    .collect();

                let update = BatteryUpdate::from_properties(&changed);
                if update.is_empty() {
                    debug!("ignoring property change with no recognized keys");
                    continue;
                }
                if events.send(Event::Battery(update)).await.is_err() {
                    break;
                }
            }
        }
    }

    Ok(())
}
