//! Registry of device handles keyed by address.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::DeviceConfig;
use crate::device::NexDevice;
use crate::error::Result;
use crate::transport::TransportProvider;

/// Owns one [`NexDevice`] per configured address.
pub struct SessionRegistry<P: TransportProvider> {
    provider: Arc<P>,
    devices: RwLock<HashMap<String, Arc<NexDevice<P>>>>,
}

impl<P: TransportProvider> SessionRegistry<P> {
    /// Creates an empty registry resolving devices through `provider`.
    #[must_use]
    pub fn new(provider: Arc<P>) -> Self {
        Self {
            provider,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the device for `config.address`, creating it if needed.
    ///
    /// A registered device whose configuration differs only in rated power
    /// keeps its session and takes the new power. Any other change replaces
    /// the device; the old one is disconnected.
    pub async fn register(&self, config: DeviceConfig) -> Arc<NexDevice<P>> {
        let mut devices = self.devices.write().await;

        if let Some(device) = devices.get(&config.address) {
            let current = device
                .session()
                .config()
                .clone()
                .rated_power_watts(config.rated_power_watts);
            if current == config {
                device.set_rated_power(config.rated_power_watts);
                return Arc::clone(device);
            }
        }

        if let Some(old) = devices.remove(&config.address) {
            tracing::debug!("configuration of {} changed, replacing device", config.address);
            if let Err(e) = old.disconnect().await {
                tracing::debug!("error disconnecting replaced device: {}", e);
            }
        }

        tracing::debug!("registering device {}", config.address);
        let address = config.address.clone();
        let device = Arc::new(NexDevice::new(Arc::clone(&self.provider), config));
        devices.insert(address, Arc::clone(&device));
        device
    }

    /// Looks up a device by address.
    pub async fn get(&self, address: &str) -> Option<Arc<NexDevice<P>>> {
        self.devices
            .read()
            .await
            .get(&address.to_uppercase())
            .cloned()
    }

    /// Removes a device and disconnects it.
    pub async fn remove(&self, address: &str) -> Result<bool> {
        let removed = self.devices.write().await.remove(&address.to_uppercase());
        match removed {
            Some(device) => {
                device.disconnect().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns the registered addresses.
    pub async fn addresses(&self) -> Vec<String> {
        self.devices.read().await.keys().cloned().collect()
    }

    /// Returns the number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Returns true if no device is registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }
}
