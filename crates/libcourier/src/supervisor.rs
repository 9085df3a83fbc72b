use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use courier_protocol::Event;

use crate::broker::EventBroker;
use crate::client::{ClientEvent, ClientFactory};
use crate::error::CourierError;
use crate::session::SessionRegistry;

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay before the post-creation liveness re-check. Covers restored
    /// sessions that come up authenticated without emitting a transition.
    pub verify_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            verify_delay: Duration::from_millis(1500),
        }
    }
}

/// Outcome of an initialization request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new session was registered; connection proceeds in the background.
    Started,
    /// The tenant already has a session; nothing was done.
    Existing,
}

/// Owns client creation and lifecycle-event handling for every tenant.
///
/// `initialize` never waits for the connection itself: pairing is gated on
/// end-user action and can take minutes. Callers poll the status service or
/// subscribe to the relay instead.
pub struct ConnectionSupervisor {
    registry: Arc<SessionRegistry>,
    broker: Arc<EventBroker>,
    factory: Arc<dyn ClientFactory>,
    config: SupervisorConfig,
}

impl ConnectionSupervisor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broker: Arc<EventBroker>,
        factory: Arc<dyn ClientFactory>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            broker,
            factory,
            config,
        }
    }

    /// Register a session for `tenant_id` and start connecting in the
    /// background. Idempotent: a second call for a live tenant is a no-op.
    pub async fn initialize(&self, tenant_id: &str) -> Result<InitOutcome, CourierError> {
        if tenant_id.is_empty() {
            return Err(CourierError::InvalidRequest(
                "tenant_id must not be empty".to_string(),
            ));
        }

        if !self.registry.insert_pending(tenant_id).await {
            debug!(tenant_id, "session already registered");
            return Ok(InitOutcome::Existing);
        }

        // The pump must be listening before the client starts connecting so
        // no pairing code is lost.
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(Self::pump_events(
            Arc::clone(&self.registry),
            Arc::clone(&self.broker),
            tenant_id.to_string(),
            events_rx,
        ));
        self.registry.attach_pump(tenant_id, pump).await;

        tokio::spawn(Self::connect(
            Arc::clone(&self.registry),
            Arc::clone(&self.broker),
            Arc::clone(&self.factory),
            self.config.verify_delay,
            tenant_id.to_string(),
            events_tx,
        ));

        info!(tenant_id, "session initialization started");
        Ok(InitOutcome::Started)
    }

    /// Tear the session down: abort the pump, close the handle, drop the
    /// entry and any cached pairing code. Returns false (no error) when no
    /// session exists.
    pub async fn disconnect(&self, tenant_id: &str) -> bool {
        let Some(removed) = self.registry.remove(tenant_id).await else {
            debug!(tenant_id, "disconnect for unknown tenant ignored");
            return false;
        };

        if let Some(pump) = removed.pump {
            pump.abort();
        }
        if let Some(handle) = removed.handle {
            handle.disconnect().await;
        }

        self.broker.publish(Event::Disconnected {
            tenant_id: tenant_id.to_string(),
        });
        info!(tenant_id, "session disconnected");
        true
    }

    async fn connect(
        registry: Arc<SessionRegistry>,
        broker: Arc<EventBroker>,
        factory: Arc<dyn ClientFactory>,
        verify_delay: Duration,
        tenant_id: String,
        events_tx: mpsc::UnboundedSender<ClientEvent>,
    ) {
        match factory.create(&tenant_id, events_tx).await {
            Ok(handle) => {
                if !registry.attach_handle(&tenant_id, Arc::clone(&handle)).await {
                    // Disconnect raced the creation; close the orphan.
                    warn!(%tenant_id, "session removed before client creation finished");
                    handle.disconnect().await;
                    return;
                }
                info!(%tenant_id, "client created");

                // A restored session can already be authenticated and emit no
                // state transition; re-check against the client directly.
                tokio::time::sleep(verify_delay).await;
                match handle.is_connected().await {
                    Ok(true) => {
                        if registry.mark_connected(&tenant_id, true).await {
                            debug!(%tenant_id, "restored session already connected");
                        }
                    }
                    Ok(false) => {}
                    Err(err) => warn!(%tenant_id, %err, "post-create liveness check failed"),
                }
            }
            Err(err) => {
                error!(%tenant_id, %err, "client creation failed");
                registry.remove(&tenant_id).await;
                broker.publish(Event::AuthFailed {
                    tenant_id,
                    error: err.to_string(),
                });
            }
        }
    }

    async fn pump_events(
        registry: Arc<SessionRegistry>,
        broker: Arc<EventBroker>,
        tenant_id: String,
        mut events_rx: mpsc::UnboundedReceiver<ClientEvent>,
    ) {
        while let Some(event) = events_rx.recv().await {
            match event {
                ClientEvent::PairingCode { code } => {
                    registry.set_pairing_code(&tenant_id, code.clone()).await;
                    broker.publish(Event::PairingCode {
                        tenant_id: tenant_id.clone(),
                        code,
                    });
                }
                ClientEvent::StateChange(state) if state.is_online() => {
                    registry.mark_connected(&tenant_id, true).await;
                    broker.publish(Event::Ready {
                        tenant_id: tenant_id.clone(),
                    });
                }
                ClientEvent::StateChange(state) if state.is_offline() => {
                    // Credentials are kept: the tenant can restore later.
                    registry.mark_connected(&tenant_id, false).await;
                    broker.publish(Event::Disconnected {
                        tenant_id: tenant_id.clone(),
                    });
                }
                ClientEvent::StateChange(state) => {
                    debug!(%tenant_id, ?state, "transitional client state");
                }
                ClientEvent::Message(payload) => {
                    broker.publish(Event::Message {
                        tenant_id: tenant_id.clone(),
                        payload,
                    });
                }
                ClientEvent::Call(payload) => {
                    broker.publish(Event::Call {
                        tenant_id: tenant_id.clone(),
                        payload,
                    });
                }
            }
        }
        debug!(%tenant_id, "event pump stopped");
    }
}
