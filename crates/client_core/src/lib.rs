use std::{collections::BTreeSet, sync::Arc, time::Duration};

use shared::{
    domain::ConversationId,
    protocol::{ClientEvent, GatewayEvent, SendMessagePayload},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod token;
pub mod transport;

pub use token::{HttpTokenSource, TokenError, TokenSource};
pub use transport::{GatewayConnector, GatewaySink, GatewaySource, WsConnector};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Connectivity of the realtime session, owned entirely by the session
/// manager. Consumers observe transitions through `subscribe_events`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Error,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(SessionState),
    MessageReceived(serde_json::Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("realtime session is not connected")]
    NotConnected,
}

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_attempts: 6,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based), doubling from
    /// `initial_delay` and capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}

/// Manages one connection to the conversation gateway on behalf of UI
/// consumers: lazy initialization, the connectivity state machine, and
/// reconnection with a fresh credential per attempt.
///
/// All methods are safe to call from any task; a single driver task owns the
/// socket so no two connection attempts are ever in flight.
pub struct RealtimeSession {
    base_url: String,
    token_source: Arc<dyn TokenSource>,
    connector: Arc<dyn GatewayConnector>,
    policy: ReconnectPolicy,
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
}

struct SessionInner {
    state: SessionState,
    joined: BTreeSet<ConversationId>,
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    driver: Option<JoinHandle<()>>,
}

impl RealtimeSession {
    pub fn new(base_url: impl Into<String>, token_source: Arc<dyn TokenSource>) -> Arc<Self> {
        Self::with_dependencies(
            base_url,
            token_source,
            Arc::new(WsConnector),
            ReconnectPolicy::default(),
        )
    }

    pub fn with_dependencies(
        base_url: impl Into<String>,
        token_source: Arc<dyn TokenSource>,
        connector: Arc<dyn GatewayConnector>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            base_url: base_url.into(),
            token_source,
            connector,
            policy,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                joined: BTreeSet::new(),
                outbound: None,
                driver: None,
            }),
            events,
        })
    }

    /// Starts the session lazily. A no-op while a connection is live or being
    /// established; restarts the machine from Idle, Disconnected or Error.
    pub async fn initialize(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Connecting | SessionState::Connected | SessionState::Reconnecting => {
                return
            }
            SessionState::Idle | SessionState::Disconnected | SessionState::Error => {}
        }
        self.set_state_locked(&mut inner, SessionState::Connecting);
        let session = Arc::clone(self);
        inner.driver = Some(tokio::spawn(async move {
            session.run().await;
        }));
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == SessionState::Connected
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Sends a message into the conversation. Fails fast while not connected;
    /// nothing is queued for later.
    pub async fn send(
        &self,
        conversation: &ConversationId,
        message: serde_json::Value,
    ) -> Result<(), SessionError> {
        let inner = self.inner.lock().await;
        if inner.state != SessionState::Connected {
            return Err(SessionError::NotConnected);
        }
        let Some(outbound) = &inner.outbound else {
            return Err(SessionError::NotConnected);
        };
        outbound
            .send(ClientEvent::SendMessage(SendMessagePayload {
                conversation_id: conversation.clone(),
                message,
            }))
            .map_err(|_| SessionError::NotConnected)
    }

    /// Subscribes the session to a conversation. Announced immediately when
    /// connected and re-announced after every reconnect; while offline the
    /// membership is recorded and deferred until the next connect.
    pub async fn join(&self, conversation: &ConversationId) {
        let mut inner = self.inner.lock().await;
        inner.joined.insert(conversation.clone());
        if inner.state == SessionState::Connected {
            if let Some(outbound) = &inner.outbound {
                let _ = outbound.send(ClientEvent::JoinConversation(conversation.clone()));
            }
        }
    }

    /// Stops the session. Terminal until `initialize` is called again.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        // abort under the lock so a driver mid-transition can never write a
        // state after Disconnected
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        inner.outbound = None;
        self.set_state_locked(&mut inner, SessionState::Disconnected);
        drop(inner);
        info!("realtime session shut down");
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;
        loop {
            // every attempt handshakes with a freshly issued credential
            let fetched = self.token_source.fetch_token().await;
            let token = match fetched {
                Ok(token) => token,
                Err(TokenError::Unauthorized) => {
                    error!("socket token request rejected; app session is gone");
                    self.fail().await;
                    return;
                }
                Err(error) => {
                    warn!(%error, "socket token request failed");
                    if !self.backoff_or_fail(&mut attempt).await {
                        return;
                    }
                    continue;
                }
            };

            let halves = match self.connector.connect(&self.base_url, &token).await {
                Ok(halves) => halves,
                Err(error) => {
                    warn!(%error, "gateway connection failed");
                    if !self.backoff_or_fail(&mut attempt).await {
                        return;
                    }
                    continue;
                }
            };

            attempt = 0;
            let outbound = self.on_connected().await;
            info!("realtime session connected");
            self.pump(halves, outbound).await;

            warn!("gateway connection lost");
            self.on_connection_lost().await;
            if !self.backoff_or_fail(&mut attempt).await {
                return;
            }
        }
    }

    /// Installs the outbound queue, replays joined conversations and flips
    /// the state. Replayed joins are queued first, so they reach the gateway
    /// before anything sent afterwards.
    async fn on_connected(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().await;
        for room in &inner.joined {
            let _ = tx.send(ClientEvent::JoinConversation(room.clone()));
        }
        inner.outbound = Some(tx);
        self.set_state_locked(&mut inner, SessionState::Connected);
        rx
    }

    async fn on_connection_lost(&self) {
        let mut inner = self.inner.lock().await;
        inner.outbound = None;
    }

    async fn fail(&self) {
        let mut inner = self.inner.lock().await;
        inner.outbound = None;
        self.set_state_locked(&mut inner, SessionState::Error);
    }

    /// Returns false when the retry budget is exhausted and the session has
    /// degraded to `Error`.
    async fn backoff_or_fail(&self, attempt: &mut u32) -> bool {
        *attempt += 1;
        if *attempt > self.policy.max_attempts {
            error!(attempts = *attempt - 1, "reconnect budget exhausted");
            self.fail().await;
            return false;
        }
        self.set_state(SessionState::Reconnecting).await;
        let delay = self.policy.delay_for(*attempt);
        debug!(
            attempt = *attempt,
            delay_ms = delay.as_millis() as u64,
            "waiting before reconnect"
        );
        tokio::time::sleep(delay).await;
        true
    }

    async fn pump(
        &self,
        halves: (Box<dyn GatewaySink>, Box<dyn GatewaySource>),
        mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    ) {
        let (mut sink, mut source) = halves;
        loop {
            tokio::select! {
                outgoing = outbound.recv() => {
                    match outgoing {
                        Some(event) => {
                            if let Err(error) = sink.send(event).await {
                                warn!(%error, "failed to send on gateway stream");
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = source.next_event() => {
                    match incoming {
                        Some(Ok(GatewayEvent::NewMessage(payload))) => {
                            let _ = self.events.send(SessionEvent::MessageReceived(payload));
                        }
                        Some(Err(error)) => {
                            debug!(%error, "gateway stream error");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn set_state(&self, state: SessionState) {
        let mut inner = self.inner.lock().await;
        self.set_state_locked(&mut inner, state);
    }

    fn set_state_locked(&self, inner: &mut SessionInner, state: SessionState) {
        if inner.state == state {
            return;
        }
        inner.state = state;
        let _ = self.events.send(SessionEvent::StateChanged(state));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
