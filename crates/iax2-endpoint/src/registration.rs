//! Registration relationships and their supervisor.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::events::{EndpointEvent, RegistrationEvent};
use crate::traits::RegistrationExchange;

/// Shortest refresh interval accepted. A zero interval would spin the
/// refresh task.
const MIN_REFRESH: Duration = Duration::from_secs(1);

/// One periodic presence relationship with a remote peer.
///
/// A registrant owns the task that sends the initial REGREQ and every
/// refresh after it. Stopping the task does not send the final
/// unregister; that is the manager's job, outside any lock.
pub struct Registrant {
    host: String,
    username: String,
    password: String,
    refresh: Duration,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Registrant {
    fn spawn(
        host: String,
        username: String,
        password: String,
        refresh: Duration,
        exchange: Arc<dyn RegistrationExchange>,
        events: mpsc::Sender<EndpointEvent>,
    ) -> Arc<Self> {
        let refresh = refresh.max(MIN_REFRESH);
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task_host = host.clone();
        let task_username = username.clone();
        let task_password = password.clone();
        let task = tokio::spawn(async move {
            // First tick fires immediately: the initial REGREQ goes out as
            // soon as the relationship exists.
            let mut ticker = time::interval(refresh);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut announced = false;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match exchange
                            .register(&task_host, &task_username, &task_password, refresh)
                            .await
                        {
                            Ok(()) => {
                                if !announced {
                                    announced = true;
                                    info!(host = %task_host, username = %task_username, "registered");
                                    let _ = events.try_send(EndpointEvent::Registration(
                                        RegistrationEvent::Registered {
                                            host: task_host.clone(),
                                            username: task_username.clone(),
                                        },
                                    ));
                                }
                            }
                            Err(e) => {
                                warn!(
                                    host = %task_host,
                                    username = %task_username,
                                    error = %e,
                                    "registration refresh failed"
                                );
                                let _ = events.try_send(EndpointEvent::Registration(
                                    RegistrationEvent::RefreshFailed {
                                        host: task_host.clone(),
                                        username: task_username.clone(),
                                        reason: e.to_string(),
                                    },
                                ));
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!(host = %task_host, username = %task_username, "registrant task stopped");
        });

        Arc::new(Self {
            host,
            username,
            password,
            refresh,
            shutdown,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh
    }

    pub fn matches(&self, host: &str, username: &str) -> bool {
        self.host == host && self.username == username
    }

    /// Stop the refresh task and wait for it.
    async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Owns every registration relationship of one endpoint.
///
/// Duplicate (host, username) pairs are permitted: each `register` call
/// appends an independent relationship with its own refresh task, and
/// each `unregister` removes one. Queries match the first in order.
pub struct RegistrationManager {
    registrants: Mutex<Vec<Arc<Registrant>>>,
    exchange: Arc<dyn RegistrationExchange>,
    events: mpsc::Sender<EndpointEvent>,
}

impl RegistrationManager {
    pub fn new(
        exchange: Arc<dyn RegistrationExchange>,
        events: mpsc::Sender<EndpointEvent>,
    ) -> Self {
        Self {
            registrants: Mutex::new(Vec::new()),
            exchange,
            events,
        }
    }

    /// Create a relationship and start refreshing. No duplicate check.
    pub fn register(
        &self,
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        refresh: Duration,
    ) {
        let registrant = Registrant::spawn(
            host.into(),
            username.into(),
            password.into(),
            refresh,
            self.exchange.clone(),
            self.events.clone(),
        );
        debug!(host = %registrant.host(), username = %registrant.username(), "registration added");
        self.registrants.lock().push(registrant);
    }

    /// Remove the first relationship matching the pair.
    ///
    /// The refresh task is stopped and the final unregister sent after
    /// the list lock is released, so a slow network operation never
    /// blocks other registration calls. An unknown pair is a no-op.
    pub async fn unregister(&self, host: &str, username: &str) {
        let removed = {
            let mut registrants = self.registrants.lock();
            registrants
                .iter()
                .position(|r| r.matches(host, username))
                .map(|index| registrants.remove(index))
        };
        let Some(registrant) = removed else {
            debug!(host, username, "unregister for unknown pair ignored");
            return;
        };
        self.finalize(registrant).await;
    }

    /// Whether any relationship matches the pair.
    pub fn is_registered(&self, host: &str, username: &str) -> bool {
        self.registrants
            .lock()
            .iter()
            .any(|r| r.matches(host, username))
    }

    pub fn count(&self) -> usize {
        self.registrants.lock().len()
    }

    /// Username of the first relationship with `host`, used to attribute
    /// inbound calls from a registered peer.
    pub fn username_for_host(&self, host: &str) -> Option<String> {
        self.registrants
            .lock()
            .iter()
            .find(|r| r.host() == host)
            .map(|r| r.username().to_string())
    }

    /// Credentials of the first relationship with `host`, borrowed by
    /// outbound calls to a registered peer.
    pub fn credentials_for_host(&self, host: &str) -> Option<(String, String)> {
        self.registrants
            .lock()
            .iter()
            .find(|r| r.host() == host)
            .map(|r| (r.username().to_string(), r.password().to_string()))
    }

    /// Drain every relationship in registration order, sending the final
    /// unregister for each.
    pub async fn shutdown(&self) {
        loop {
            let next = {
                let mut registrants = self.registrants.lock();
                if registrants.is_empty() {
                    None
                } else {
                    Some(registrants.remove(0))
                }
            };
            let Some(registrant) = next else { break };
            self.finalize(registrant).await;
        }
    }

    async fn finalize(&self, registrant: Arc<Registrant>) {
        registrant.stop().await;
        let host = registrant.host().to_string();
        let username = registrant.username().to_string();
        if let Err(e) = self.exchange.unregister(&host, &username).await {
            warn!(host = %host, username = %username, error = %e, "final unregister failed");
        }
        info!(host = %host, username = %username, "unregistered");
        let _ = self.events.try_send(EndpointEvent::Registration(
            RegistrationEvent::Unregistered { host, username },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NoopRegistrationExchange;

    fn manager() -> (RegistrationManager, mpsc::Receiver<EndpointEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        (
            RegistrationManager::new(Arc::new(NoopRegistrationExchange), events_tx),
            events_rx,
        )
    }

    #[tokio::test]
    async fn register_then_query_then_unregister() {
        let (manager, _events) = manager();
        manager.register("pbx.example", "alice", "secret", Duration::from_secs(60));

        assert!(manager.is_registered("pbx.example", "alice"));
        assert!(!manager.is_registered("pbx.example", "bob"));
        assert_eq!(manager.count(), 1);

        manager.unregister("pbx.example", "alice").await;
        assert!(!manager.is_registered("pbx.example", "alice"));
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn duplicate_pairs_are_independent_relationships() {
        let (manager, _events) = manager();
        manager.register("pbx.example", "alice", "one", Duration::from_secs(60));
        manager.register("pbx.example", "alice", "two", Duration::from_secs(60));
        assert_eq!(manager.count(), 2);

        manager.unregister("pbx.example", "alice").await;
        assert_eq!(manager.count(), 1);
        assert!(manager.is_registered("pbx.example", "alice"));

        manager.unregister("pbx.example", "alice").await;
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn unregister_for_unknown_pair_is_a_no_op() {
        let (manager, _events) = manager();
        manager.register("pbx.example", "alice", "secret", Duration::from_secs(60));
        manager.unregister("pbx.example", "nobody").await;
        manager.unregister("elsewhere.example", "alice").await;
        assert_eq!(manager.count(), 1);
    }

    #[tokio::test]
    async fn credentials_come_from_the_first_match() {
        let (manager, _events) = manager();
        manager.register("pbx.example", "alice", "secret", Duration::from_secs(60));
        manager.register("pbx.example", "bob", "hunter2", Duration::from_secs(60));

        let (username, password) = manager.credentials_for_host("pbx.example").unwrap();
        assert_eq!(username, "alice");
        assert_eq!(password, "secret");
        assert_eq!(manager.username_for_host("pbx.example").as_deref(), Some("alice"));
        assert_eq!(manager.username_for_host("unknown.example"), None);
    }

    #[tokio::test]
    async fn shutdown_drains_in_registration_order() {
        let (manager, mut events) = manager();
        manager.register("a.example", "alice", "x", Duration::from_secs(60));
        manager.register("b.example", "bob", "y", Duration::from_secs(60));
        manager.shutdown().await;
        assert_eq!(manager.count(), 0);

        let mut unregistered = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let EndpointEvent::Registration(RegistrationEvent::Unregistered { host, .. }) = event
            {
                unregistered.push(host);
            }
        }
        assert_eq!(unregistered, vec!["a.example", "b.example"]);
    }
}
