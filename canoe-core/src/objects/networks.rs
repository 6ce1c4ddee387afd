//! Networks, devices and diagnostic device discovery.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::collection::Collection;
use crate::errors::Result;
use crate::objects::diagnostic::Diagnostic;
use crate::proxy::Proxy;
use crate::value::Value;

proxy! {
    pub struct Network;
}

impl Network {
    getters! {
        name: String => "Name";
        /// Numeric bus type, see [`BusType`](crate::objects::application::BusType).
        bus_type: i32 => "BusType";
    }

    pub fn devices(&self) -> Result<Collection<Device>> {
        self.handle.child("Devices")
    }
}

proxy! {
    /// A node on a network.
    pub struct Device;
}

impl Device {
    getters! {
        name: String => "Name";
    }

    children! {
        diagnostic: Diagnostic => "Diagnostic";
        audio_interface: AudioInterface => "AudioInterface";
    }

    /// `None` when the device reports no diagnostic description.
    pub fn diagnostic_opt(&self) -> Result<Option<Diagnostic>> {
        self.handle.child_opt("Diagnostic")
    }
}

proxy! {
    /// Audio lines of a device.  `line` selects the in/out line.
    pub struct AudioInterface;
}

impl AudioInterface {
    pub fn mute(&self, line: i32) -> Result<bool> {
        self.handle.get_at("Mute", &[Value::from(line)])
    }

    /// Writes the mute state, then reads back what the server applied.
    pub fn set_mute(&self, line: i32, mute: bool) -> Result<bool> {
        self.handle.put_at("Mute", &[Value::from(line)], mute)?;
        self.mute(line)
    }

    pub fn volume(&self, line: i32) -> Result<i32> {
        self.handle.get_at("Volume", &[Value::from(line)])
    }

    /// Writes the volume, then reads back what the server applied.
    pub fn set_volume(&self, line: i32, volume: i32) -> Result<i32> {
        self.handle.put_at("Volume", &[Value::from(line)], volume)?;
        self.volume(line)
    }

    pub fn connect_to_label(&self, line: i32, label: i32) -> Result<()> {
        self.handle
            .invoke("ConnectToLabel", &[Value::from(line), Value::from(label)])
            .map(drop)
    }

    pub fn disconnect_from_label(&self, line: i32, label: i32) -> Result<()> {
        self.handle
            .invoke("DisconnectFromLabel", &[Value::from(line), Value::from(label)])
            .map(drop)
    }
}

/// Collect the diagnostic interface of every device on every network,
/// keyed by device name.
///
/// Failures while enumerating the networks or a network's device list are
/// returned.  A failure reading one device's name or diagnostic interface
/// skips only that device.
pub fn fetch_diag_devices(networks: &Collection<Network>) -> Result<BTreeMap<String, Diagnostic>> {
    let mut found = BTreeMap::new();
    for network in networks.iter()? {
        let devices = network?.devices()?;
        for device in devices.iter()? {
            let lookup = device.and_then(|d| Ok((d.name()?, d.diagnostic_opt()?)));
            match lookup {
                Ok((name, Some(diag))) => {
                    debug!("diagnostic device '{name}' found");
                    found.insert(name, diag);
                }
                Ok((name, None)) => debug!("device '{name}' has no diagnostic interface"),
                Err(e) => warn!("skipping device without diagnostic access: {e}"),
            }
        }
    }
    Ok(found)
}
