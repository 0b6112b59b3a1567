//! A long-lived set of devices kept in step with what is plugged in.
//!
//! Devices are keyed by name and address, so a device that is already known
//! (and possibly connected) is never replaced by a fresh copy on rescan.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use log::info;

use crate::device::Device;
use crate::enumerate::get_devices;
use crate::error::Result;
use crate::router::{Addr, ClientId, PortId, Router};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceKey {
    pub name: String,
    pub client: ClientId,
    pub port: PortId,
}

impl DeviceKey {
    fn of<R: Router>(device: &Device<R>) -> Self {
        Self {
            name: device.name().unwrap_or_default().to_string(),
            client: device.client(),
            port: device.port(),
        }
    }

    pub fn addr(&self) -> Addr {
        Addr::new(self.client, self.port)
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr())
    }
}

/// What changed during one [`DevicePool::scan`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub plugged: Vec<DeviceKey>,
    pub unplugged: Vec<DeviceKey>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.plugged.is_empty() && self.unplugged.is_empty()
    }
}

pub struct DevicePool<R: Router + Clone> {
    router: R,
    plugged: BTreeMap<DeviceKey, Device<R>>,
    unplugged: BTreeMap<DeviceKey, Device<R>>,
}

impl<R: Router + Clone> DevicePool<R> {
    pub fn new(router: R) -> Self {
        Self {
            router,
            plugged: BTreeMap::new(),
            unplugged: BTreeMap::new(),
        }
    }

    /// Re-enumerates the router and moves devices between the plugged and
    /// unplugged sets.
    pub fn scan(&mut self) -> Result<ScanReport> {
        let mut report = ScanReport::default();
        let mut seen = BTreeSet::new();

        for device in get_devices(&self.router)? {
            let key = DeviceKey::of(&device);
            seen.insert(key.clone());
            if self.plugged.contains_key(&key) {
                continue;
            }
            if self.unplugged.remove(&key).is_some() {
                info!("Device plugged back in: {}", key);
            } else {
                info!("Device plugged in: {}", key);
            }
            self.plugged.insert(key.clone(), device);
            report.plugged.push(key);
        }

        let gone: Vec<DeviceKey> = self
            .plugged
            .keys()
            .filter(|key| !seen.contains(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(mut device) = self.plugged.remove(&key) {
                device.close();
                info!("Device unplugged: {}", key);
                self.unplugged.insert(key.clone(), device);
                report.unplugged.push(key);
            }
        }
        Ok(report)
    }

    pub fn plugged(&self) -> impl Iterator<Item = &Device<R>> {
        self.plugged.values()
    }

    pub fn unplugged(&self) -> impl Iterator<Item = &Device<R>> {
        self.unplugged.values()
    }

    pub fn is_plugged(&self, key: &DeviceKey) -> bool {
        self.plugged.contains_key(key)
    }

    pub fn get(&self, key: &DeviceKey) -> Option<&Device<R>> {
        self.plugged.get(key)
    }

    pub fn get_mut(&mut self, key: &DeviceKey) -> Option<&mut Device<R>> {
        self.plugged.get_mut(key)
    }

    /// The plugged device at `addr`, whatever its name.
    pub fn find_mut(&mut self, addr: Addr) -> Option<&mut Device<R>> {
        self.plugged
            .iter_mut()
            .find(|(key, _)| key.addr() == addr)
            .map(|(_, device)| device)
    }
}
