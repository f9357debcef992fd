//! High-level [`NexDevice`] handle.
//!
//! Every command first refreshes the status with a hello, so the element
//! clock is set and the caller gets the latest reading before the command
//! frame goes out.

use std::sync::Arc;

use bytes::Bytes;

use crate::config::DeviceConfig;
use crate::error::{Error, FrameError, Result};
use crate::event::Subscription;
use crate::protocol::{encode_hello, encode_no_op, encode_turn_off, encode_turn_on};
use crate::session::{Session, millis};
use crate::transport::TransportProvider;
use crate::types::{ConnectionState, DeviceReading, OperationMode, StatusResponse};

/// Client for one NEX heating element.
pub struct NexDevice<P: TransportProvider> {
    session: Session<P>,
}

impl<P: TransportProvider> NexDevice<P> {
    /// Creates a device handle (not yet connected).
    #[must_use]
    pub fn new(provider: Arc<P>, config: DeviceConfig) -> Self {
        Self {
            session: Session::new(provider, config),
        }
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &Session<P> {
        &self.session
    }

    /// Returns the device address.
    #[must_use]
    pub fn address(&self) -> &str {
        self.session.address()
    }

    /// Returns the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.session.connection_state()
    }

    /// Subscribes to device events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.session.subscribe()
    }

    /// Returns the most recent reading without contacting the device.
    pub async fn last_reading(&self) -> Option<DeviceReading> {
        self.session.last_reading().await
    }

    /// Returns the rated power used for energy readings.
    #[must_use]
    pub fn rated_power(&self) -> u32 {
        self.session.rated_power()
    }

    /// Changes the rated power used for energy readings.
    pub fn set_rated_power(&self, watts: u32) {
        self.session.set_rated_power(watts);
    }

    /// Sends a hello with the local time and waits for the status.
    ///
    /// A device that stays silent is not an error: the last known reading
    /// comes back as [`StatusResponse::Stale`], or [`StatusResponse::NoData`].
    pub async fn update_status(&self) -> Result<StatusResponse> {
        self.session.ensure_connected().await?;

        let hello = encode_hello(&chrono::Local::now());
        let response = self
            .session
            .send_and_await(hello, self.session.config().response_timeout)
            .await?;

        match &response {
            StatusResponse::Fresh(_) => {}
            StatusResponse::Stale(_) => {
                tracing::debug!("no status from {}, using last reading", self.address());
            }
            StatusResponse::NoData => {
                tracing::debug!("no status from {} yet", self.address());
            }
        }
        Ok(response)
    }

    /// Switches the element on at the given target temperature.
    pub async fn turn_on(&self, target_temp: f64) -> Result<()> {
        let frame = encode_turn_on(target_temp)?;
        self.command(frame).await
    }

    /// Switches the element off.
    pub async fn turn_off(&self) -> Result<()> {
        self.command(encode_turn_off()).await
    }

    /// Sends a frame with no effect, refreshing the status on the way.
    pub async fn no_op(&self) -> Result<()> {
        self.command(encode_no_op()).await
    }

    async fn command(&self, frame: Bytes) -> Result<()> {
        self.update_status().await?;
        self.session.send(frame).await
    }

    /// Sets the target temperature, returning the value actually applied.
    ///
    /// The value is clamped to the limits of the latest reading. It is sent
    /// to the device only while the element is on; otherwise the next
    /// [`set_mode`](Self::set_mode) picks it up from the device.
    pub async fn set_temperature(&self, target_temp: f64) -> Result<f64> {
        if !target_temp.is_finite() {
            return Err(FrameError::TemperatureOutOfRange { value: target_temp }.into());
        }

        let reading = match self.last_reading().await {
            Some(reading) => Some(reading),
            None => self.update_status().await?.reading().copied(),
        };
        let Some(reading) = reading else {
            tracing::debug!("no reading from {}, temperature not applied", self.address());
            return Ok(target_temp);
        };

        let applied = reading.clamp_temperature(target_temp);
        if (applied - target_temp).abs() > f64::EPSILON {
            tracing::debug!("clamped target {} to {}", target_temp, applied);
        }
        if reading.mode() == OperationMode::On {
            self.turn_on(applied).await?;
        }
        Ok(applied)
    }

    /// Switches the element on at its current target, or off.
    pub async fn set_mode(&self, mode: OperationMode) -> Result<()> {
        match mode {
            OperationMode::Off => self.turn_off().await,
            OperationMode::On => {
                let response = self.update_status().await?;
                let reading = response.reading().ok_or_else(|| Error::ResponseTimeout {
                    timeout_ms: millis(self.session.config().response_timeout),
                })?;
                let frame = encode_turn_on(reading.target_temp)?;
                self.session.send(frame).await
            }
        }
    }

    /// Disconnects from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.session.disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RetryBudget;
    use crate::event::Event;
    use crate::transport::WRITE_CHARACTERISTIC;
    use crate::transport::mock::{MockProvider, init_tracing, status_fragments, status_payload};

    fn device(provider: &MockProvider) -> NexDevice<MockProvider> {
        init_tracing();
        let config = DeviceConfig::new("AA:BB:CC:DD:EE:FF")
            .connect(RetryBudget::new(2, Duration::from_secs(1)))
            .notify(RetryBudget::new(2, Duration::from_secs(1)));
        NexDevice::new(Arc::new(provider.clone()), config)
    }

    fn written(provider: &MockProvider) -> Vec<String> {
        provider
            .handle
            .writes()
            .into_iter()
            .map(|(characteristic, data)| {
                assert_eq!(characteristic, WRITE_CHARACTERISTIC);
                hex::encode(data)
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_status_fresh() {
        let provider = MockProvider::default();
        let device = device(&provider);
        let mut events = device.subscribe();

        provider
            .handle
            .reply_with(status_fragments(&status_payload(1, 48, 60, 120)));
        let response = device.update_status().await.unwrap();

        let reading = response.reading().copied().unwrap();
        assert!(response.is_fresh());
        assert_eq!(reading.mode(), OperationMode::On);
        assert!((reading.energy_used_kwh - 0.8).abs() < 1e-9);
        assert_eq!(device.last_reading().await, Some(reading));

        assert_eq!(events.recv().await, Some(Event::Connected));
        assert_eq!(events.recv().await, Some(Event::Reading(reading)));

        let writes = written(&provider);
        assert_eq!(writes.len(), 1);
        assert!(writes[0].starts_with("aaaaaaaa0b000083"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_status_silent_device() {
        let provider = MockProvider::default();
        let device = device(&provider);

        let response = device.update_status().await.unwrap();
        assert_eq!(response, StatusResponse::NoData);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_status_connect_failure() {
        let provider = MockProvider::default();
        provider.handle.fail_connects(10);
        let device = device(&provider);

        let err = device.update_status().await.unwrap_err();
        assert!(matches!(err, Error::ConnectFailed { attempts: 2, .. }));
        assert!(provider.handle.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_on_sends_hello_then_command() {
        let provider = MockProvider::default();
        let device = device(&provider);

        provider
            .handle
            .reply_with(status_fragments(&status_payload(0, 20, 55, 0)));
        device.turn_on(75.0).await.unwrap();

        let writes = written(&provider);
        assert_eq!(writes.len(), 2);
        assert!(writes[0].starts_with("aaaaaaaa0b000083"));
        assert_eq!(writes[1], "aaaaaaaa050000844b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_on_rejects_bad_temperature_before_connecting() {
        let provider = MockProvider::default();
        let device = device(&provider);

        let err = device.turn_on(300.0).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Frame(FrameError::TemperatureOutOfRange { .. })
        ));
        assert_eq!(provider.handle.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_turn_off_and_no_op() {
        let provider = MockProvider::default();
        let device = device(&provider);

        device.turn_off().await.unwrap();
        device.no_op().await.unwrap();

        let writes = written(&provider);
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[1], "aaaaaaaa0500008200");
        assert_eq!(writes[3], "aaaaaaaa0400000d");
        assert_eq!(provider.handle.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_temperature_clamps_and_sends_when_on() {
        let provider = MockProvider::default();
        let device = device(&provider);

        let on = status_fragments(&status_payload(1, 40, 60, 0));
        provider.handle.reply_with(on.clone());
        provider.handle.reply_with(on);
        let applied = device.set_temperature(85.0).await.unwrap();
        assert!((applied - 70.0).abs() < f64::EPSILON);

        let writes = written(&provider);
        assert_eq!(writes.last().unwrap(), "aaaaaaaa0500008446");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_temperature_when_off_sends_nothing() {
        let provider = MockProvider::default();
        let device = device(&provider);

        provider
            .handle
            .reply_with(status_fragments(&status_payload(0, 40, 60, 0)));
        let applied = device.set_temperature(10.0).await.unwrap();
        assert!((applied - 30.0).abs() < f64::EPSILON);

        // Only the hello used to learn the limits
        assert_eq!(written(&provider).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_temperature_rejects_nan() {
        let provider = MockProvider::default();
        let device = device(&provider);
        assert!(device.set_temperature(f64::NAN).await.is_err());
        assert_eq!(provider.handle.connect_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_on_uses_device_target() {
        let provider = MockProvider::default();
        let device = device(&provider);

        provider
            .handle
            .reply_with(status_fragments(&status_payload(0, 40, 62, 0)));
        device.set_mode(OperationMode::On).await.unwrap();

        let writes = written(&provider);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], "aaaaaaaa050000843e");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_on_without_reading() {
        let provider = MockProvider::default();
        let device = device(&provider);

        let err = device.set_mode(OperationMode::On).await.unwrap_err();
        assert!(matches!(err, Error::ResponseTimeout { timeout_ms: 2000 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_mode_off() {
        let provider = MockProvider::default();
        let device = device(&provider);

        device.set_mode(OperationMode::Off).await.unwrap();
        assert_eq!(written(&provider)[1], "aaaaaaaa0500008200");
    }
}
