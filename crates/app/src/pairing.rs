//! Pairing coordinator: drives discovered devices through pair-setup,
//! pair-verify and unpair.
//!
//! Every protocol step is bounded by the configured timeout. Any failure
//! while pairing or verifying unpairs the device at the protocol level so
//! it can be retried from scratch, and the roster records why.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hkhub_domain::accessory::Accessory;
use hkhub_domain::device::CloseReason;
use hkhub_domain::error::{HubError, ProtocolError, ProtocolOperation, TimeoutError};
use hkhub_domain::id::DeviceId;
use hkhub_domain::setup_code::SetupCode;
use tokio::task::JoinHandle;

use crate::ports::{AccessoryProtocol, DiscoveryEvent};
use crate::roster::DeviceRoster;

/// Deadline applied to each pairing step when none is configured.
pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(5);

/// Orchestrates the pairing lifecycle on top of an [`AccessoryProtocol`].
pub struct PairingCoordinator<P> {
    protocol: Arc<P>,
    roster: Arc<DeviceRoster>,
    timeout: Duration,
}

impl<P> Clone for PairingCoordinator<P> {
    fn clone(&self) -> Self {
        Self {
            protocol: Arc::clone(&self.protocol),
            roster: Arc::clone(&self.roster),
            timeout: self.timeout,
        }
    }
}

impl<P: AccessoryProtocol> PairingCoordinator<P> {
    #[must_use]
    pub fn new(protocol: Arc<P>, roster: Arc<DeviceRoster>, timeout: Duration) -> Self {
        Self {
            protocol,
            roster,
            timeout,
        }
    }

    #[must_use]
    pub fn roster(&self) -> &Arc<DeviceRoster> {
        &self.roster
    }

    #[must_use]
    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    /// Start browsing and feed discovery events into the roster.
    ///
    /// Devices that come back already paired are verified automatically.
    /// The returned task runs until the protocol closes its discovery
    /// channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the protocol cannot start discovery.
    pub async fn start_discovery(&self) -> Result<JoinHandle<()>, HubError> {
        let mut events = self.protocol.start_discovery().await?;
        let this = self.clone();
        Ok(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_discovery(event);
            }
            tracing::debug!("discovery channel closed");
        }))
    }

    fn handle_discovery(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Discovered { id, paired } => {
                let device = self.roster.on_discovered(id, paired);
                if device.needs_verify() {
                    tracing::info!(device_id = %device.id, "paired device found, verifying");
                    self.request_verify(device.id);
                }
            }
            DiscoveryEvent::Lost { id } => {
                self.roster.on_lost(&id);
            }
        }
    }

    /// Pair with the setup code, then verify.
    ///
    /// On any failure the device is unpaired at the protocol level and left
    /// unpaired in the roster with the failure recorded.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown device, otherwise the
    /// protocol or timeout error of the failing step.
    #[tracing::instrument(skip(self, id, code), fields(device_id = %id))]
    pub async fn pair_setup_and_verify(
        &self,
        id: &DeviceId,
        code: &SetupCode,
    ) -> Result<(), HubError> {
        self.roster.get_device(id)?;
        if let Err(err) = self
            .bounded(ProtocolOperation::PairSetup, self.protocol.pair_setup(id, code))
            .await
        {
            tracing::warn!(error = %err, "pair-setup failed");
            self.force_unpair(id, &err).await;
            return Err(err);
        }
        if let Err(err) = self.roster.mark_paired(id) {
            tracing::warn!(error = %err, "device left the roster during pair-setup");
            self.force_unpair(id, &err).await;
            return Err(err);
        }
        tracing::info!("paired");
        self.pair_verify(id).await
    }

    /// Establish a session with a paired device.
    ///
    /// A no-op when the device is already verified or a verify is in
    /// flight. On success the accessory list is fetched in the background.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown device, otherwise the
    /// protocol or timeout error of the verify step.
    #[tracing::instrument(skip(self, id), fields(device_id = %id))]
    pub async fn pair_verify(&self, id: &DeviceId) -> Result<(), HubError> {
        if !self.roster.begin_verify(id)? {
            tracing::debug!("already verified or verifying");
            return Ok(());
        }
        match self
            .bounded(ProtocolOperation::PairVerify, self.protocol.pair_verify(id))
            .await
        {
            Ok(()) => {
                self.roster.mark_verified(id)?;
                tracing::info!("verified");
                self.spawn_fetch(id.clone());
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "pair-verify failed");
                self.force_unpair(id, &err).await;
                Err(err)
            }
        }
    }

    /// Remove the pairing on request.
    ///
    /// The roster is closed with [`CloseReason::Unpaired`] whether or not
    /// the protocol call succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::NotFound`] for an unknown device, otherwise the
    /// protocol or timeout error of the unpair call.
    #[tracing::instrument(skip(self, id), fields(device_id = %id))]
    pub async fn unpair_device(&self, id: &DeviceId) -> Result<(), HubError> {
        self.roster.get_device(id)?;
        let result = self
            .bounded(ProtocolOperation::Unpair, self.protocol.unpair(id))
            .await;
        self.roster.close(id, CloseReason::Unpaired);
        if let Err(err) = &result {
            tracing::warn!(error = %err, "unpair failed, closed anyway");
        }
        result
    }

    /// Fetch the accessory list of a verified device and cache it in the
    /// roster.
    ///
    /// # Errors
    ///
    /// Returns the protocol or timeout error, or [`HubError::NotFound`] if
    /// the device left the roster meanwhile.
    #[tracing::instrument(skip(self, id), fields(device_id = %id))]
    pub async fn fetch_accessories(&self, id: &DeviceId) -> Result<Vec<Accessory>, HubError> {
        let accessories = self
            .bounded(
                ProtocolOperation::ListAccessories,
                self.protocol.accessories(id),
            )
            .await?;
        tracing::debug!(count = accessories.len(), "accessories fetched");
        if self.roster.get_device(id)?.is_verified() {
            self.roster.set_accessories(id, accessories.clone())?;
        } else {
            tracing::debug!("session closed while fetching, list not cached");
        }
        Ok(accessories)
    }

    /// Non-blocking variant of [`Self::pair_setup_and_verify`].
    pub fn request_pairing(&self, id: DeviceId, code: SetupCode) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.pair_setup_and_verify(&id, &code).await {
                tracing::warn!(device_id = %id, error = %err, "pairing request failed");
            }
        })
    }

    /// Non-blocking variant of [`Self::pair_verify`].
    pub fn request_verify(&self, id: DeviceId) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.pair_verify(&id).await {
                tracing::warn!(device_id = %id, error = %err, "verify request failed");
            }
        })
    }

    /// Non-blocking variant of [`Self::unpair_device`].
    pub fn request_unpair(&self, id: DeviceId) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.unpair_device(&id).await {
                tracing::warn!(device_id = %id, error = %err, "unpair request failed");
            }
        })
    }

    fn spawn_fetch(&self, id: DeviceId) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.fetch_accessories(&id).await {
                tracing::warn!(device_id = %id, error = %err, "accessory fetch failed");
            }
        });
    }

    async fn force_unpair(&self, id: &DeviceId, cause: &HubError) {
        if let Err(err) = self
            .bounded(ProtocolOperation::Unpair, self.protocol.unpair(id))
            .await
        {
            tracing::warn!(device_id = %id, error = %err, "cleanup unpair failed");
        }
        self.roster.close(id, close_reason(cause));
    }

    async fn bounded<T>(
        &self,
        operation: ProtocolOperation,
        call: impl Future<Output = Result<T, ProtocolError>>,
    ) -> Result<T, HubError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(HubError::from),
            Err(_) => Err(TimeoutError {
                operation,
                after: self.timeout,
            }
            .into()),
        }
    }
}

fn close_reason(cause: &HubError) -> CloseReason {
    match cause {
        HubError::Timeout(_) => CloseReason::TimedOut,
        HubError::Protocol(err) if err.operation == ProtocolOperation::PairSetup => {
            CloseReason::PairingFailed(err.source.to_string())
        }
        HubError::Protocol(err) => CloseReason::VerifyFailed(err.source.to_string()),
        other => CloseReason::VerifyFailed(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use hkhub_domain::device::DeviceState;
    use hkhub_domain::event::LifecycleKind;
    use hkhub_domain::id::{AccessoryId, InstanceId, SubscriptionId};
    use hkhub_domain::value::CharacteristicValue;
    use tokio::sync::mpsc;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::ports::Notifications;

    #[derive(Default)]
    struct StubProtocol {
        reject_setup: bool,
        reject_verify: bool,
        verify_delay: Option<Duration>,
        calls: Mutex<Vec<&'static str>>,
        discovery: Mutex<Option<mpsc::UnboundedReceiver<DiscoveryEvent>>>,
        /// Roster that loses the device while pair-setup runs.
        lose_during_setup: Mutex<Option<Arc<DeviceRoster>>>,
    }

    impl StubProtocol {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AccessoryProtocol for StubProtocol {
        async fn start_discovery(
            &self,
        ) -> Result<mpsc::UnboundedReceiver<DiscoveryEvent>, ProtocolError> {
            self.discovery
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| ProtocolError::new(ProtocolOperation::Discovery, "started twice"))
        }

        async fn pair_setup(&self, id: &DeviceId, _: &SetupCode) -> Result<(), ProtocolError> {
            self.record("pair_setup");
            if let Some(roster) = self.lose_during_setup.lock().unwrap().take() {
                roster.on_lost(id);
            }
            if self.reject_setup {
                return Err(ProtocolError::new(ProtocolOperation::PairSetup, "wrong pin"));
            }
            Ok(())
        }

        async fn pair_verify(&self, _: &DeviceId) -> Result<(), ProtocolError> {
            self.record("pair_verify");
            if let Some(delay) = self.verify_delay {
                tokio::time::sleep(delay).await;
            }
            if self.reject_verify {
                return Err(ProtocolError::new(ProtocolOperation::PairVerify, "bad proof"));
            }
            Ok(())
        }

        async fn unpair(&self, _: &DeviceId) -> Result<(), ProtocolError> {
            self.record("unpair");
            Ok(())
        }

        async fn accessories(&self, _: &DeviceId) -> Result<Vec<Accessory>, ProtocolError> {
            Ok(vec![Accessory::new(1)])
        }

        async fn get_characteristic(
            &self,
            _: &DeviceId,
            _: AccessoryId,
            _: InstanceId,
        ) -> Result<CharacteristicValue, ProtocolError> {
            Ok(CharacteristicValue::Bool(false))
        }

        async fn put_characteristic(
            &self,
            _: &DeviceId,
            _: AccessoryId,
            _: InstanceId,
            _: CharacteristicValue,
        ) -> Result<(), ProtocolError> {
            Ok(())
        }

        async fn subscribe_to_events(
            &self,
            _: &DeviceId,
            _: AccessoryId,
            _: InstanceId,
        ) -> Result<Notifications, ProtocolError> {
            let (_sender, receiver) = mpsc::unbounded_channel();
            Ok(Notifications {
                id: SubscriptionId::new(),
                receiver,
            })
        }

        async fn unsubscribe_from_events(
            &self,
            _: &DeviceId,
            _: AccessoryId,
            _: InstanceId,
            _: SubscriptionId,
        ) {
        }
    }

    fn setup(protocol: StubProtocol) -> (PairingCoordinator<StubProtocol>, Arc<StubProtocol>) {
        let protocol = Arc::new(protocol);
        let roster = Arc::new(DeviceRoster::default());
        roster.on_discovered(DeviceId::from("dev"), false);
        let coordinator = PairingCoordinator::new(
            Arc::clone(&protocol),
            roster,
            Duration::from_millis(200),
        );
        (coordinator, protocol)
    }

    fn code() -> SetupCode {
        SetupCode::parse("111-22-333").unwrap()
    }

    fn dev() -> DeviceId {
        DeviceId::from("dev")
    }

    #[tokio::test]
    async fn should_pair_and_verify_device() {
        let (coordinator, protocol) = setup(StubProtocol::default());
        let mut events = coordinator.roster().subscribe();

        coordinator.pair_setup_and_verify(&dev(), &code()).await.unwrap();

        let device = coordinator.roster().get_device(&dev()).unwrap();
        assert_eq!(device.state(), DeviceState::Verified);
        assert_eq!(protocol.calls(), vec!["pair_setup", "pair_verify"]);
        assert_eq!(events.recv().await.unwrap().kind, LifecycleKind::Paired);
        assert_eq!(events.recv().await.unwrap().kind, LifecycleKind::Verified);
        assert_eq!(
            events.recv().await.unwrap().kind,
            LifecycleKind::AccessoriesUpdated
        );
    }

    #[tokio::test]
    async fn should_unpair_and_close_when_setup_fails() {
        let (coordinator, protocol) = setup(StubProtocol {
            reject_setup: true,
            ..Default::default()
        });
        let mut events = coordinator.roster().subscribe();

        let err = coordinator
            .pair_setup_and_verify(&dev(), &code())
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Protocol(_)));
        assert_eq!(protocol.calls(), vec!["pair_setup", "unpair"]);
        let closed = events.recv().await.unwrap();
        assert_eq!(closed.kind, LifecycleKind::Closed);
        assert_eq!(
            closed.device.state(),
            DeviceState::Closed(CloseReason::PairingFailed("wrong pin".into()))
        );
    }

    #[tokio::test]
    async fn should_unpair_when_device_disappears_during_setup() {
        let (coordinator, protocol) = setup(StubProtocol::default());
        *protocol.lose_during_setup.lock().unwrap() = Some(Arc::clone(coordinator.roster()));

        let err = coordinator
            .pair_setup_and_verify(&dev(), &code())
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::NotFound(_)));
        assert_eq!(protocol.calls(), vec!["pair_setup", "unpair"]);
        assert!(coordinator.roster().get_devices().is_empty());
    }

    #[tokio::test]
    async fn should_unpair_and_close_when_verify_fails() {
        let (coordinator, protocol) = setup(StubProtocol {
            reject_verify: true,
            ..Default::default()
        });

        let err = coordinator
            .pair_setup_and_verify(&dev(), &code())
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::Protocol(_)));
        assert_eq!(protocol.calls(), vec!["pair_setup", "pair_verify", "unpair"]);
        let device = coordinator.roster().get_device(&dev()).unwrap();
        assert!(!device.paired);
        assert_eq!(
            device.close_reason,
            Some(CloseReason::VerifyFailed("bad proof".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_slow_verify() {
        let (coordinator, protocol) = setup(StubProtocol {
            verify_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });

        let err = coordinator
            .pair_setup_and_verify(&dev(), &code())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HubError::Timeout(TimeoutError {
                operation: ProtocolOperation::PairVerify,
                ..
            })
        ));
        assert!(protocol.calls().contains(&"unpair"));
        let device = coordinator.roster().get_device(&dev()).unwrap();
        assert_eq!(device.state(), DeviceState::Closed(CloseReason::TimedOut));
    }

    #[tokio::test]
    async fn should_reject_unknown_device() {
        let (coordinator, protocol) = setup(StubProtocol::default());

        let err = coordinator
            .pair_setup_and_verify(&DeviceId::from("ghost"), &code())
            .await
            .unwrap_err();

        assert!(matches!(err, HubError::NotFound(_)));
        assert!(protocol.calls().is_empty());
    }

    #[tokio::test]
    async fn should_close_as_unpaired_on_explicit_unpair() {
        let (coordinator, _) = setup(StubProtocol::default());
        coordinator.pair_setup_and_verify(&dev(), &code()).await.unwrap();
        let mut closed = Box::pin(coordinator.roster().events(LifecycleKind::Closed));

        coordinator.unpair_device(&dev()).await.unwrap();

        let event = closed.next().await.unwrap();
        assert_eq!(event.device.close_reason, Some(CloseReason::Unpaired));
        assert_eq!(event.device.state(), DeviceState::Discovered);
    }

    #[tokio::test]
    async fn should_skip_verify_when_already_verified() {
        let (coordinator, protocol) = setup(StubProtocol::default());
        coordinator.pair_setup_and_verify(&dev(), &code()).await.unwrap();

        coordinator.pair_verify(&dev()).await.unwrap();

        assert_eq!(protocol.calls(), vec!["pair_setup", "pair_verify"]);
    }

    #[tokio::test]
    async fn should_auto_verify_paired_device_on_discovery() {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (coordinator, protocol) = setup(StubProtocol {
            discovery: Mutex::new(Some(receiver)),
            ..Default::default()
        });
        let mut verified = Box::pin(coordinator.roster().events(LifecycleKind::Verified));
        let task = coordinator.start_discovery().await.unwrap();

        sender
            .send(DiscoveryEvent::Discovered {
                id: DeviceId::from("known"),
                paired: true,
            })
            .unwrap();

        let event = verified.next().await.unwrap();
        assert_eq!(event.device.id, DeviceId::from("known"));
        assert_eq!(protocol.calls(), vec!["pair_verify"]);

        drop(sender);
        task.await.unwrap();
    }
}
