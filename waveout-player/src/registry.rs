//! Open-device registry
//!
//! Maps device ids to open handles so callers can address devices by id.
//! Unknown or closed ids report `BadDevice`. There is no fixed ceiling on the
//! number of open devices.

use crate::buffer::WaveBuffer;
use crate::device::OutputDevice;
use crate::events::EventSink;
use crate::handle::WaveOutDevice;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;
use waveout_common::config::PlayerConfig;
use waveout_common::{Error, MmTime, Result, TimeFormat, WaveFormat};

/// Registry of open output devices
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<Uuid, Arc<WaveOutDevice>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a device and register it, returning its id.
    pub fn open<D, E>(&self, format: WaveFormat, device: D, events: E, config: &PlayerConfig) -> Result<Uuid>
    where
        D: OutputDevice + 'static,
        E: EventSink,
    {
        let handle = WaveOutDevice::open(format, device, events, config)?;
        let id = handle.id();
        self.devices.write().unwrap_or_else(PoisonError::into_inner).insert(id, Arc::new(handle));
        debug!("Registered device {} ({} open)", id, self.len());
        Ok(id)
    }

    /// Look up an open device.
    pub fn get(&self, id: Uuid) -> Result<Arc<WaveOutDevice>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::BadDevice(format!("no open device {}", id)))
    }

    pub fn submit(&self, id: Uuid, buffer: &Arc<WaveBuffer>) -> Result<()> {
        self.get(id)?.submit(buffer)
    }

    pub fn pause(&self, id: Uuid) -> Result<()> {
        self.get(id)?.pause()
    }

    pub fn restart(&self, id: Uuid) -> Result<()> {
        self.get(id)?.restart()
    }

    pub fn reset(&self, id: Uuid) -> Result<()> {
        self.get(id)?.reset()
    }

    pub fn break_loop(&self, id: Uuid) -> Result<()> {
        self.get(id)?.break_loop()
    }

    pub fn position(&self, id: Uuid, time_format: TimeFormat) -> Result<MmTime> {
        self.get(id)?.position_in(time_format)
    }

    /// Close a device and drop it from the registry.
    ///
    /// A device that refuses to close (`StillPlaying`) stays registered.
    pub fn close(&self, id: Uuid) -> Result<()> {
        let device = self.get(id)?;
        device.close()?;
        self.devices.write().unwrap_or_else(PoisonError::into_inner).remove(&id);
        debug!("Unregistered device {}", id);
        Ok(())
    }

    /// Ids of all open devices
    pub fn ids(&self) -> Vec<Uuid> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
