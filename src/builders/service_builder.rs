//! Builder wiring the reservation services from configuration and collaborators.

use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::config::ReservationConfig;
use crate::core::{
    AppResult, AvailabilityBroadcaster, AvailabilityCalculator, BookingService, Coordination,
    Notifier, NotificationDispatcher, ReservationCoordinator, ResourceStore, Spawn,
    WaitlistManager, WaitlistStore,
};
use crate::infra::{InMemoryCoordination, InMemoryStore, LogDispatcher};
use crate::runtime::TokioSpawner;
use crate::util::clock::{Clock, SystemClock};

/// Explicitly constructed service graph with process-scoped lifetime.
#[derive(Clone)]
pub struct ReservationServices {
    /// Configuration the services were built from.
    pub config: ReservationConfig,
    /// Shared lock, cache and pub/sub backend.
    pub coordination: Arc<dyn Coordination>,
    /// Slot availability calculator.
    pub calculator: Arc<AvailabilityCalculator>,
    /// Reservation coordinator.
    pub coordinator: Arc<ReservationCoordinator>,
    /// Live availability broadcaster.
    pub broadcaster: AvailabilityBroadcaster,
    /// Booking lifecycle.
    pub bookings: Arc<BookingService>,
    /// Waitlist queues.
    pub waitlist: Arc<WaitlistManager>,
}

impl ReservationServices {
    /// Start background tasks (availability refresher).
    pub fn start(&self) {
        self.broadcaster.start();
    }

    /// Stop background tasks.
    pub fn shutdown(&self) {
        self.broadcaster.shutdown();
        tracing::info!("reservation services stopped");
    }
}

/// Collects collaborators, defaulting to the in-memory adapters.
pub struct ServiceBuilder {
    config: ReservationConfig,
    resource_store: Option<Arc<dyn ResourceStore>>,
    waitlist_store: Option<Arc<dyn WaitlistStore>>,
    coordination: Option<Arc<dyn Coordination>>,
    dispatcher: Option<Arc<dyn NotificationDispatcher>>,
    spawner: Option<Arc<dyn Spawn>>,
    clock: Option<Arc<dyn Clock>>,
}

impl ServiceBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: ReservationConfig) -> Self {
        Self {
            config,
            resource_store: None,
            waitlist_store: None,
            coordination: None,
            dispatcher: None,
            spawner: None,
            clock: None,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ReservationConfig {
        &self.config
    }

    /// Use one backend for both resource and waitlist data.
    #[must_use]
    pub fn with_store<S>(mut self, store: Arc<S>) -> Self
    where
        S: ResourceStore + WaitlistStore + 'static,
    {
        let resources: Arc<dyn ResourceStore> = store.clone();
        let waitlist: Arc<dyn WaitlistStore> = store;
        self.resource_store = Some(resources);
        self.waitlist_store = Some(waitlist);
        self
    }

    /// Resource and booking store.
    #[must_use]
    pub fn with_resource_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.resource_store = Some(store);
        self
    }

    /// Waitlist store.
    #[must_use]
    pub fn with_waitlist_store(mut self, store: Arc<dyn WaitlistStore>) -> Self {
        self.waitlist_store = Some(store);
        self
    }

    /// Lock, cache and pub/sub backend.
    #[must_use]
    pub fn with_coordination(mut self, coordination: Arc<dyn Coordination>) -> Self {
        self.coordination = Some(coordination);
        self
    }

    /// Outbound notification channel.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Runtime used for background work.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawn>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and wire every service.
    ///
    /// Without an explicit spawner this must run inside a tokio runtime.
    pub fn build(self) -> AppResult<ReservationServices> {
        self.config
            .validate()
            .map_err(|e| anyhow!("config invalid: {e}"))?;

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let spawner: Arc<dyn Spawn> = match self.spawner {
            Some(spawner) => spawner,
            None => Arc::new(
                TokioSpawner::try_current()
                    .context("no spawner configured and no tokio runtime is running")?,
            ),
        };
        let (resource_store, waitlist_store) = match (self.resource_store, self.waitlist_store) {
            (Some(resources), Some(waitlist)) => (resources, waitlist),
            (resources, waitlist) => {
                let memory = Arc::new(InMemoryStore::with_clock(Arc::clone(&clock)));
                let memory_resources: Arc<dyn ResourceStore> = memory.clone();
                let memory_waitlist: Arc<dyn WaitlistStore> = memory;
                (
                    resources.unwrap_or(memory_resources),
                    waitlist.unwrap_or(memory_waitlist),
                )
            }
        };
        let coordination: Arc<dyn Coordination> = self
            .coordination
            .unwrap_or_else(|| Arc::new(InMemoryCoordination::new()));
        let dispatcher: Arc<dyn NotificationDispatcher> =
            self.dispatcher.unwrap_or_else(|| Arc::new(LogDispatcher));
        let notifier = Notifier::new(dispatcher, Arc::clone(&spawner));

        let config = self.config;
        let calculator = Arc::new(AvailabilityCalculator::new(
            Arc::clone(&resource_store),
            config.slots.clone(),
            config.retry.policy(),
            Arc::clone(&clock),
        ));
        let coordinator = Arc::new(ReservationCoordinator::new(
            Arc::clone(&calculator),
            Arc::clone(&coordination),
            config.locking.clone(),
            Arc::clone(&clock),
        ));
        let broadcaster = AvailabilityBroadcaster::new(
            Arc::clone(&calculator),
            Arc::clone(&coordination),
            Arc::clone(&spawner),
            Arc::clone(&clock),
            config.broadcast.clone(),
        );
        let bookings = Arc::new(BookingService::new(
            resource_store,
            Arc::clone(&coordinator),
            broadcaster.clone(),
            notifier.clone(),
        ));
        let waitlist = Arc::new(WaitlistManager::new(
            waitlist_store,
            Arc::clone(&coordination),
            notifier,
            &config.locking,
            config.waitlist.clone(),
            clock,
        ));

        tracing::info!(
            debounce_ms = config.broadcast.debounce_ms,
            lock_ttl_ms = config.locking.lock_ttl_ms,
            "reservation services built"
        );
        Ok(ReservationServices {
            config,
            coordination,
            calculator,
            coordinator,
            broadcaster,
            bookings,
            waitlist,
        })
    }
}
