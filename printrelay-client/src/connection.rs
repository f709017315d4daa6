//! Connection management.

use crate::error::ClientError;
use crate::transport::{Connector, Link, TransportEvent};
use parking_lot::{Mutex, ReentrantMutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Delay between a lost connection and the next attempt (3 s).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// Default bound on a single connect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Fixed delay before every reconnect attempt. Never grows.
    pub retry_delay: Duration,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Connection phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

type StateObserver = Arc<dyn Fn(ConnectionState) + Send + Sync>;
type FrameObserver = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct Slot {
    state: ConnectionState,
    /// Bumped by `start` and `stop`. Transitions from an older loop are ignored.
    generation: u64,
    /// Outbound half of the live link; `Some` only while connected.
    outbound: Option<mpsc::UnboundedSender<String>>,
}

/// State shared between the manager handle and its connection loop.
#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    /// Held from a state change until its observers have run.
    ordering: ReentrantMutex<()>,
    state_observers: Mutex<Vec<StateObserver>>,
    frame_observers: Mutex<Vec<FrameObserver>>,
    attempts: AtomicU64,
}

impl Shared {
    /// Starts a new generation, orphaning whichever loop owned the previous one.
    fn next_generation(&self) -> u64 {
        let mut slot = self.slot.lock();
        slot.generation += 1;
        slot.generation
    }

    /// Moves to `next` and notifies observers, unless already there.
    ///
    /// Returns `false` when `generation` is stale; the caller must then exit.
    fn transition(
        &self,
        generation: u64,
        next: ConnectionState,
        outbound: Option<mpsc::UnboundedSender<String>>,
    ) -> bool {
        let _ordered = self.ordering.lock();
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return false;
            }
            slot.outbound = outbound;
            if slot.state == next {
                return true;
            }
            tracing::debug!("Connection state {} -> {}", slot.state, next);
            slot.state = next;
        }

        let observers = self.state_observers.lock().clone();
        for observer in observers {
            observer(next);
        }
        true
    }

    fn dispatch_frame(&self, frame: &str) {
        let observers = self.frame_observers.lock().clone();
        for observer in observers {
            observer(frame);
        }
    }

    /// Runs an open link until it closes. Returns `false` if the loop was
    /// stopped in the meantime.
    async fn serve(&self, generation: u64, link: Link) -> bool {
        let Link {
            outbound,
            mut inbound,
        } = link;

        if !self.transition(generation, ConnectionState::Connected, Some(outbound)) {
            return false;
        }

        loop {
            match inbound.recv().await {
                Some(TransportEvent::Frame(frame)) => {
                    tracing::debug!("Received frame ({} bytes)", frame.len());
                    self.dispatch_frame(&frame);
                }
                Some(TransportEvent::Closed) | None => return true,
            }
        }
    }
}

/// Owner of the single connection to the printing daemon.
///
/// After [`start`](Self::start) the manager keeps a link open for as long as
/// it lives: every close or failure is followed by a new attempt after
/// [`ConnectionConfig::retry_delay`], with no attempt cap.
pub struct ConnectionManager<C: Connector> {
    config: ConnectionConfig,
    connector: Arc<C>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Creates a manager (not yet started).
    pub fn new(config: ConnectionConfig, connector: C) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
        }
    }

    /// Starts the connection loop against `endpoint`.
    ///
    /// Fails with [`ClientError::AlreadyStarted`] while a loop is running,
    /// including during the wait between attempts. Must be called from
    /// within a tokio runtime.
    pub fn start(&self, endpoint: impl Into<String>) -> Result<(), ClientError> {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(ClientError::AlreadyStarted);
        }

        let endpoint = endpoint.into();
        tracing::debug!("Starting connection loop for {}", endpoint);
        *task = Some(tokio::spawn(connection_loop(
            endpoint,
            self.shared.next_generation(),
            self.config.clone(),
            self.connector.clone(),
            self.shared.clone(),
        )));
        Ok(())
    }

    /// Transmits a pre-serialized frame over the live link.
    pub fn send(&self, frame: String) -> Result<(), ClientError> {
        let slot = self.shared.slot.lock();
        let sender = match (&slot.state, &slot.outbound) {
            (ConnectionState::Connected, Some(sender)) => sender,
            _ => {
                tracing::debug!("send() called but not connected");
                return Err(ClientError::NotConnected);
            }
        };
        sender.send(frame).map_err(|_| ClientError::ConnectionClosed)
    }

    /// Registers a callback invoked on every state transition.
    pub fn on_state_change(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.shared.state_observers.lock().push(Arc::new(observer));
    }

    /// Registers a callback invoked with every inbound frame, in arrival order.
    pub fn on_frame(&self, observer: impl Fn(&str) + Send + Sync + 'static) {
        self.shared.frame_observers.lock().push(Arc::new(observer));
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        self.shared.slot.lock().state
    }

    /// Returns whether the link is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Returns the number of connect attempts made so far.
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Stops the connection loop and releases the link.
    ///
    /// On return the state is `Disconnected`; a loop still finishing a poll
    /// on another worker can no longer change it.
    pub fn stop(&self) {
        let generation = self.shared.next_generation();
        if let Some(handle) = self.task.lock().take() {
            tracing::debug!("Stopping connection loop");
            handle.abort();
        }
        self.shared
            .transition(generation, ConnectionState::Disconnected, None);
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

async fn connect_with_timeout<C: Connector>(
    connector: &C,
    endpoint: &str,
    timeout: Duration,
) -> Result<Link, ClientError> {
    tokio::time::timeout(timeout, connector.connect(endpoint))
        .await
        .map_err(|_| ClientError::Timeout)?
}

async fn connection_loop<C: Connector>(
    endpoint: String,
    generation: u64,
    config: ConnectionConfig,
    connector: Arc<C>,
    shared: Arc<Shared>,
) {
    loop {
        shared.attempts.fetch_add(1, Ordering::SeqCst);
        if !shared.transition(generation, ConnectionState::Connecting, None) {
            return;
        }
        tracing::debug!("Connecting to {}...", endpoint);

        match connect_with_timeout(connector.as_ref(), &endpoint, config.connect_timeout).await {
            Ok(link) => {
                tracing::info!("Connected to {}", endpoint);
                if !shared.serve(generation, link).await {
                    return;
                }
                tracing::info!("Connection to {} closed", endpoint);
            }
            Err(e) => {
                tracing::warn!("Connection to {} failed: {}", endpoint, e);
            }
        }

        if !shared.transition(generation, ConnectionState::Disconnected, None) {
            return;
        }
        tracing::info!("Reconnecting to {} in {:?}", endpoint, config.retry_delay);
        tokio::time::sleep(config.retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockConnector;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio_test::{assert_err, assert_ok};

    const ENDPOINT: &str = "ws://host:8766/ws";

    fn record_states<C: Connector>(
        manager: &ConnectionManager<C>,
    ) -> mpsc::UnboundedReceiver<ConnectionState> {
        let (tx, rx) = mpsc::unbounded_channel();
        manager.on_state_change(move |state| {
            let _ = tx.send(state);
        });
        rx
    }

    fn assert_retry_gap(gap: Duration) {
        assert!(gap >= DEFAULT_RETRY_DELAY, "gap {:?} shorter than delay", gap);
        assert!(
            gap < DEFAULT_RETRY_DELAY + Duration::from_millis(50),
            "gap {:?} longer than delay",
            gap
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new();
        assert_eq!(config.retry_delay, Duration::from_millis(3000));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));

        let config = ConnectionConfig::new()
            .with_retry_delay(Duration::from_millis(500))
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_disconnected_and_connects() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        manager.start(ENDPOINT).unwrap();

        let remote = remotes.recv().await.unwrap();
        assert_eq!(remote.endpoint, ENDPOINT);
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));
        assert!(manager.is_connected());
        assert_eq!(manager.attempts(), 1);

        // Exactly one Connected notification.
        tokio::task::yield_now().await;
        assert!(matches!(states.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_close() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let first = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        first.close();
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert!(!manager.is_connected());

        let second = remotes.recv().await.unwrap();
        assert_retry_gap(second.at.duration_since(first.at));
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));
        assert_eq!(manager.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_n_closes_give_n_reconnect_cycles() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        manager.start(ENDPOINT).unwrap();

        let mut remote = remotes.recv().await.unwrap();
        for _ in 0..5 {
            remote.close();
            let next = remotes.recv().await.unwrap();
            assert_retry_gap(next.at.duration_since(remote.at));
            remote = next;
        }
        assert_eq!(manager.attempts(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_connect_retries_forever() {
        let (connector, mut remotes) = MockConnector::refusing();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let mut previous = remotes.recv().await.unwrap();
        assert!(previous.refused);
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));

        for _ in 0..10 {
            let next = remotes.recv().await.unwrap();
            assert_retry_gap(next.at.duration_since(previous.at));
            assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
            assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
            previous = next;
        }
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_retry_delay() {
        let (connector, mut remotes) = MockConnector::refusing();
        let config = ConnectionConfig::new().with_retry_delay(Duration::from_millis(250));
        let manager = ConnectionManager::new(config, connector);
        manager.start(ENDPOINT).unwrap();

        let first = remotes.recv().await.unwrap();
        let second = remotes.recv().await.unwrap();
        let gap = second.at.duration_since(first.at);
        assert!(gap >= Duration::from_millis(250) && gap < Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_guarded() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        assert_ok!(manager.start(ENDPOINT));
        let _remote = remotes.recv().await.unwrap();

        let err = assert_err!(manager.start(ENDPOINT));
        assert!(matches!(err, ClientError::AlreadyStarted));
        tokio::task::yield_now().await;
        assert!(matches!(remotes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_guarded_while_waiting_to_retry() {
        let (connector, mut remotes) = MockConnector::refusing();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let _first = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));

        assert!(matches!(
            manager.start(ENDPOINT),
            Err(ClientError::AlreadyStarted)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);

        assert!(matches!(
            manager.send("early".to_string()),
            Err(ClientError::NotConnected)
        ));

        manager.start(ENDPOINT).unwrap();
        let mut remote = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        manager.send("hello".to_string()).unwrap();
        assert_eq!(remote.next_frame().await.as_deref(), Some("hello"));
        // The frame sent before connecting never reached the transport.
        assert_eq!(remote.try_frame(), None);

        remote.close();
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert!(matches!(
            manager.send("late".to_string()),
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_dispatched_in_order() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let (tx, mut frames) = mpsc::unbounded_channel();
        manager.on_frame(move |frame| {
            let _ = tx.send(frame.to_string());
        });
        manager.start(ENDPOINT).unwrap();

        let remote = remotes.recv().await.unwrap();
        for i in 0..3 {
            remote.send_frame(&format!("frame-{}", i));
        }
        for i in 0..3 {
            assert_eq!(frames.recv().await, Some(format!("frame-{}", i)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_observer_sees_each_transition_once() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = count.clone();
            manager.on_state_change(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let remote = remotes.recv().await.unwrap();
        remote.close();
        // Connecting, Connected, Disconnected.
        for _ in 0..3 {
            states.recv().await.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_disconnects() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let _remote = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        manager.stop();
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        assert!(matches!(
            manager.send("x".to_string()),
            Err(ClientError::NotConnected)
        ));

        // No further attempts after stopping.
        tokio::time::sleep(DEFAULT_RETRY_DELAY * 3).await;
        assert!(matches!(remotes.try_recv(), Err(TryRecvError::Empty)));

        // A stopped manager can be started again.
        manager.start(ENDPOINT).unwrap();
        assert!(remotes.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_takes_effect_immediately() {
        let (connector, mut remotes) = MockConnector::new();
        let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();
        let _remote = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Connected));

        manager.stop();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(states.try_recv(), Ok(ConnectionState::Disconnected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stop_races_with_connect() {
        for i in 0..2000u32 {
            let (connector, _remotes) = MockConnector::new();
            let manager = ConnectionManager::new(ConnectionConfig::default(), connector);
            let last_seen = Arc::new(Mutex::new(ConnectionState::Disconnected));
            let seen = last_seen.clone();
            manager.on_state_change(move |state| {
                *seen.lock() = state;
            });

            manager.start(ENDPOINT).unwrap();
            for _ in 0..(i % 64) {
                std::hint::spin_loop();
            }
            if i % 3 == 0 {
                tokio::task::yield_now().await;
            }
            manager.stop();

            assert_eq!(manager.state(), ConnectionState::Disconnected, "iteration {}", i);
            tokio::time::sleep(Duration::from_millis(1)).await;
            assert_eq!(manager.state(), ConnectionState::Disconnected, "iteration {}", i);
            assert_eq!(*last_seen.lock(), ConnectionState::Disconnected, "iteration {}", i);
            assert!(matches!(
                manager.send("late".to_string()),
                Err(ClientError::NotConnected)
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_handshake_times_out_then_retries() {
        let (connector, mut remotes) = MockConnector::hanging();
        let config = ConnectionConfig::new().with_connect_timeout(Duration::from_secs(2));
        let manager = ConnectionManager::new(config, connector);
        let mut states = record_states(&manager);
        manager.start(ENDPOINT).unwrap();

        let first = remotes.recv().await.unwrap();
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(states.recv().await, Some(ConnectionState::Disconnected));
        let waited = tokio::time::Instant::now().duration_since(first.at);
        assert!(
            waited >= Duration::from_secs(2) && waited < Duration::from_millis(2050),
            "gave up after {:?}",
            waited
        );

        let second = remotes.recv().await.unwrap();
        let gap = second.at.duration_since(first.at);
        assert!(
            gap >= Duration::from_secs(2) + DEFAULT_RETRY_DELAY
                && gap < Duration::from_secs(2) + DEFAULT_RETRY_DELAY + Duration::from_millis(50),
            "second attempt after {:?}",
            gap
        );
        assert_eq!(states.recv().await, Some(ConnectionState::Connecting));
        assert_eq!(manager.attempts(), 2);
    }
}
