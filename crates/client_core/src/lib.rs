use std::sync::Arc;

use futures::StreamExt;
use ledger_gateway::{DeadlineGateway, HttpLedgerGateway, LedgerGateway};
use shared::{
    domain::{Address, ChainId, RegistryKind},
    protocol::RegistryBindings,
};
use tokio::{
    sync::{broadcast, watch, RwLock},
    task::JoinHandle,
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{info, warn};
use uuid::Uuid;

pub mod clock;
pub mod config;
pub mod decision;
pub mod enumerator;
pub mod error;
pub mod orchestrator;
pub mod session;
pub mod types;
pub mod validator;
pub mod view_cache;

#[cfg(test)]
pub(crate) mod test_support;

use clock::{Clock, SystemClock};
use config::{EnumerationStrategy, Settings};
use decision::DecisionMaker;
use error::{ActionFailure, ClientError};
use orchestrator::{ActionOrchestrator, InFlightActions, OrchestratorSettings};
use session::{ActiveSession, SessionEffect, SessionEvent, SessionGuard, WalletError, WalletSession};
use types::{ActionKind, ActionPhase, ActionRequest, ActionResult};
use view_cache::{LocalView, LocalViewCache};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    SessionChanged(ActiveSession),
    /// Contract bindings went stale; actions fail until [`ZombieClient::rebind`].
    RebindRequired(ChainId),
    ViewRefreshed(Arc<LocalView>),
    ActionPhase {
        action_id: Uuid,
        kind: ActionKind,
        phase: ActionPhase,
    },
    Error(String),
}

struct Binding {
    gateway: Arc<dyn LedgerGateway>,
    orchestrator: Arc<ActionOrchestrator>,
}

pub struct ZombieClient {
    settings: Settings,
    clock: Arc<dyn Clock>,
    session: watch::Sender<ActiveSession>,
    cache: Arc<LocalViewCache>,
    binding: RwLock<Option<Binding>>,
    in_flight: Arc<InFlightActions>,
    events: broadcast::Sender<ClientEvent>,
}

impl ZombieClient {
    pub async fn initialize(
        settings: Settings,
        wallet: &dyn WalletSession,
    ) -> Result<Arc<Self>, ClientError> {
        let info = wallet.connect().await?;
        info!(
            "session: connected address={} chain={}",
            info.address, info.chain_id
        );
        let bindings = settings.bindings_for(&info.chain_id)?;
        let gateway = build_gateway(&settings, bindings)?;
        let client = Self::new_with_dependencies(
            settings,
            gateway,
            ActiveSession::connected(info),
            Arc::new(SystemClock),
        );
        if let Err(err) = client.refresh_all().await {
            warn!("session: initial refresh failed: {err}");
            let _ = client.events.send(ClientEvent::Error(err.to_string()));
        }
        Ok(client)
    }

    pub fn with_gateway(
        settings: Settings,
        gateway: Arc<dyn LedgerGateway>,
        session: ActiveSession,
    ) -> Arc<Self> {
        Self::new_with_dependencies(settings, gateway, session, Arc::new(SystemClock))
    }

    pub fn new_with_dependencies(
        settings: Settings,
        gateway: Arc<dyn LedgerGateway>,
        session: ActiveSession,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        let (session, session_rx) = watch::channel(session);
        let cache = Arc::new(LocalViewCache::new(
            settings.zombie_enumeration,
            settings.kitty_enumeration,
            settings.probe_max_attempts,
            session_rx,
        ));
        let mut client = Self {
            settings,
            clock,
            session,
            cache,
            binding: RwLock::new(None),
            in_flight: Arc::new(InFlightActions::default()),
            events,
        };
        let binding = client.bind(gateway);
        client.binding = RwLock::new(Some(binding));
        Arc::new(client)
    }

    fn bind(&self, gateway: Arc<dyn LedgerGateway>) -> Binding {
        let orchestrator = Arc::new(ActionOrchestrator::new(
            Arc::clone(&gateway),
            Arc::clone(&self.cache),
            Arc::clone(&self.clock),
            OrchestratorSettings::from(&self.settings),
            Arc::clone(&self.in_flight),
            self.events.clone(),
        ));
        Binding {
            gateway,
            orchestrator,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> ActiveSession {
        self.session.borrow().clone()
    }

    pub async fn view(&self) -> Arc<LocalView> {
        self.cache.snapshot().await
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn gateway(&self) -> Result<Arc<dyn LedgerGateway>, ActionFailure> {
        self.binding
            .read()
            .await
            .as_ref()
            .map(|binding| Arc::clone(&binding.gateway))
            .ok_or(ActionFailure::ReinitializationRequired)
    }

    fn active_address(&self) -> Result<Address, ActionFailure> {
        self.session
            .borrow()
            .address
            .clone()
            .ok_or(ActionFailure::NoActiveSession)
    }

    pub async fn refresh(&self, kind: RegistryKind) -> Result<Arc<LocalView>, ActionFailure> {
        let address = self.active_address()?;
        let gateway = self.gateway().await?;
        let view = self
            .cache
            .refresh_kind(kind, gateway.as_ref(), &address)
            .await?;
        let _ = self.events.send(ClientEvent::ViewRefreshed(Arc::clone(&view)));
        Ok(view)
    }

    pub async fn refresh_all(&self) -> Result<Arc<LocalView>, ActionFailure> {
        let address = self.active_address()?;
        let gateway = self.gateway().await?;
        let view = self.cache.refresh(gateway.as_ref(), &address).await?;
        let _ = self.events.send(ClientEvent::ViewRefreshed(Arc::clone(&view)));
        Ok(view)
    }

    pub async fn perform_action(
        &self,
        request: ActionRequest,
        decisions: &dyn DecisionMaker,
    ) -> ActionResult {
        let guard = match SessionGuard::new(self.session.subscribe()) {
            Ok(guard) => guard,
            Err(failure) => return ActionResult::Failed(failure),
        };
        let orchestrator = match self.binding.read().await.as_ref() {
            Some(binding) => Arc::clone(&binding.orchestrator),
            None => return ActionResult::Failed(ActionFailure::ReinitializationRequired),
        };
        orchestrator.run(request, guard, decisions).await
    }

    pub async fn handle_session_event(&self, event: SessionEvent) -> SessionEffect {
        let mut next = ActiveSession::default();
        let mut effect = SessionEffect::Unchanged;
        self.session.send_if_modified(|current| {
            let (applied, applied_effect) = current.apply(&event);
            let modified = *current != applied;
            *current = applied.clone();
            next = applied;
            effect = applied_effect;
            modified
        });
        if effect != SessionEffect::Unchanged {
            let _ = self.events.send(ClientEvent::SessionChanged(next));
        }

        match &effect {
            SessionEffect::Cleared => {
                info!("session: cleared");
                self.cache.clear().await;
            }
            SessionEffect::AddressSwitched(address) => {
                info!("session: switched to {address}");
                self.cache.clear().await;
                if let Err(err) = self.refresh_all().await {
                    warn!("session: refresh after account switch failed: {err}");
                    let _ = self.events.send(ClientEvent::Error(err.to_string()));
                }
            }
            SessionEffect::RebindRequired(chain_id) => {
                warn!("session: network changed to {chain_id}; registry bindings dropped");
                *self.binding.write().await = None;
                self.cache.clear().await;
                let _ = self
                    .events
                    .send(ClientEvent::RebindRequired(chain_id.clone()));
            }
            SessionEffect::Unchanged => {}
        }
        effect
    }

    pub fn spawn_session_listener(self: &Arc<Self>, wallet: &dyn WalletSession) -> JoinHandle<()> {
        let mut stream = BroadcastStream::new(wallet.subscribe_events());
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        client.handle_session_event(event).await;
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!("session: listener lagged, skipped {skipped} wallet events");
                    }
                }
            }
            info!("session: wallet event stream closed");
        })
    }

    pub async fn rebind(&self) -> Result<(), ClientError> {
        let chain_id = self
            .session()
            .chain_id
            .ok_or(ClientError::Wallet(WalletError::NoAccounts))?;
        let bindings = self.settings.bindings_for(&chain_id)?;
        let gateway = build_gateway(&self.settings, bindings)?;
        info!("session: rebound registries for chain {chain_id}");
        self.rebind_with(gateway).await;
        Ok(())
    }

    pub async fn rebind_with(&self, gateway: Arc<dyn LedgerGateway>) {
        let binding = self.bind(gateway);
        *self.binding.write().await = Some(binding);
        if self.session().is_connected() {
            if let Err(err) = self.refresh_all().await {
                warn!("session: refresh after rebind failed: {err}");
                let _ = self.events.send(ClientEvent::Error(err.to_string()));
            }
        }
    }
}

fn build_gateway(
    settings: &Settings,
    bindings: RegistryBindings,
) -> Result<Arc<dyn LedgerGateway>, ClientError> {
    let listing: Vec<RegistryKind> = [
        (RegistryKind::Zombie, settings.zombie_enumeration),
        (RegistryKind::Kitty, settings.kitty_enumeration),
    ]
    .into_iter()
    .filter(|(_, strategy)| *strategy == EnumerationStrategy::Native)
    .map(|(registry, _)| registry)
    .collect();
    let http = HttpLedgerGateway::new(settings.rpc_url()?, bindings).with_listing(&listing);

    let gateway: Arc<dyn LedgerGateway> = match settings.call_timeout() {
        Some(deadline) => Arc::new(DeadlineGateway::new(http, deadline)),
        None => Arc::new(http),
    };
    Ok(gateway)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
