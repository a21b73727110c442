use std::sync::Arc;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::engine::{Engine, TickReport, TickTrigger};

const REPORT_CAPACITY: usize = 64;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Drives the engine: a tick shortly after start, one per interval, one per
/// snapshot delivery, and one per `force_check`. Every trigger funnels into the
/// same entry point, [`Engine::tick`].
pub struct Scheduler {
    engine: Arc<Engine>,
    config: SchedulerConfig,
    manual: Arc<Notify>,
    reports: broadcast::Sender<TickReport>,
    running: Option<Running>,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, config: SchedulerConfig) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            engine,
            config,
            manual: Arc::new(Notify::new()),
            reports,
            running: None,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Reports of completed ticks. Ticks skipped for lack of a snapshot are not sent.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<TickReport> {
        self.reports.subscribe()
    }

    /// Subscribe to both repositories and arm the timers. No-op if already running.
    pub fn start(&mut self) {
        if self.running.is_some() {
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(
            self.engine.clone(),
            self.config,
            self.manual.clone(),
            self.reports.clone(),
            cancel.clone(),
        ));
        self.running = Some(Running { cancel, handle });
        info!(
            "room status scheduler started (interval {:?}, first check after {:?})",
            self.config.tick_interval, self.config.startup_delay
        );
    }

    /// Cancel timers and release subscriptions. Ticks already running finish on
    /// their own; the engine snapshot is discarded.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else { return };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!("scheduler loop ended abnormally: {e}");
        }
        self.engine.clear_snapshot().await;
        info!("room status scheduler stopped");
    }

    /// Request an immediate tick. Ignored while stopped.
    pub fn force_check(&self) {
        if self.running.is_some() {
            info!("manual status check triggered");
            self.manual.notify_one();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.cancel.cancel();
        }
    }
}

async fn run_loop(
    engine: Arc<Engine>,
    config: SchedulerConfig,
    manual: Arc<Notify>,
    reports: broadcast::Sender<TickReport>,
    cancel: CancellationToken,
) {
    let mut rooms_rx = engine.room_repository().subscribe_rooms();
    let mut bookings_rx = engine.booking_repository().subscribe_bookings();

    // Take whatever the repositories already hold.
    let rooms = rooms_rx.borrow_and_update().clone();
    if let Some(rooms) = rooms {
        engine.replace_rooms(rooms).await;
    }
    let bookings = bookings_rx.borrow_and_update().clone();
    if let Some(bookings) = bookings {
        engine.replace_bookings(bookings).await;
    }

    let startup = tokio::time::sleep(config.startup_delay);
    tokio::pin!(startup);
    let mut startup_done = false;

    let mut interval = tokio::time::interval_at(Instant::now() + config.tick_interval, config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut rooms_open = true;
    let mut bookings_open = true;

    loop {
        let trigger = tokio::select! {
            _ = cancel.cancelled() => break,
            _ = &mut startup, if !startup_done => {
                startup_done = true;
                TickTrigger::Startup
            }
            _ = interval.tick() => TickTrigger::Interval,
            _ = manual.notified() => TickTrigger::Manual,
            changed = bookings_rx.changed(), if bookings_open => {
                if changed.is_err() {
                    debug!("booking feed closed");
                    bookings_open = false;
                    continue;
                }
                let bookings = bookings_rx.borrow_and_update().clone();
                let Some(bookings) = bookings else { continue };
                engine.replace_bookings(bookings).await;
                TickTrigger::BookingsChanged
            }
            changed = rooms_rx.changed(), if rooms_open => {
                if changed.is_err() {
                    debug!("room feed closed");
                    rooms_open = false;
                    continue;
                }
                let rooms = rooms_rx.borrow_and_update().clone();
                let Some(rooms) = rooms else { continue };
                engine.replace_rooms(rooms).await;
                TickTrigger::RoomsChanged
            }
        };
        spawn_tick(engine.clone(), trigger, reports.clone());
    }
}

/// Ticks run detached so a slow write never delays the next trigger.
fn spawn_tick(engine: Arc<Engine>, trigger: TickTrigger, reports: broadcast::Sender<TickReport>) {
    tokio::spawn(async move {
        match engine.tick(trigger).await {
            Ok(report) => {
                if report.writes() > 0 || report.failed_writes() > 0 {
                    info!(
                        "{trigger:?} tick: {} write(s), {} failed, {} slot(s) expired",
                        report.writes(),
                        report.failed_writes(),
                        report.expiry.expired_slots
                    );
                } else {
                    debug!("{trigger:?} tick: no changes");
                }
                let _ = reports.send(report);
            }
            Err(e) => debug!("{trigger:?} tick skipped: {e}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::model::*;
    use crate::store::InMemoryStore;

    const H: Ms = HOUR_MS;
    const NOW: Ms = 500 * H;

    fn scheduler_over(store: Arc<InMemoryStore>, config: SchedulerConfig) -> Scheduler {
        let clock = Arc::new(ManualClock::new(NOW));
        let engine = Arc::new(Engine::new(store.clone(), store, clock, EngineConfig::default()));
        Scheduler::new(engine, config)
    }

    fn quiet_config() -> SchedulerConfig {
        SchedulerConfig {
            tick_interval: Duration::from_secs(3600),
            startup_delay: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn start_and_stop_release_subscriptions() {
        let store = Arc::new(InMemoryStore::with_records(vec![], vec![]));
        let mut scheduler = scheduler_over(store.clone(), quiet_config());

        scheduler.start();
        assert!(scheduler.is_running());
        tokio::task::yield_now().await;
        assert_eq!(store.subscriber_count(), 2);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        assert_eq!(store.subscriber_count(), 0);
        assert!(scheduler.engine().snapshot().await.is_err());
    }

    #[tokio::test]
    async fn force_check_runs_a_manual_tick() {
        let store = Arc::new(InMemoryStore::with_records(
            vec![Room::new("r1", "101", RoomStatus::Available)],
            vec![Booking::new("a", "101", NOW - H, NOW + H, BookingType::Daily, BookingStatus::Confirmed)],
        ));
        let mut scheduler = scheduler_over(store.clone(), quiet_config());
        let mut reports = scheduler.subscribe_reports();
        scheduler.start();

        scheduler.force_check();
        let report = tokio::time::timeout(Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.trigger, TickTrigger::Manual);
        assert_eq!(report.reconcile.room_writes, 1);
        assert_eq!(store.room("r1").unwrap().status, RoomStatus::Occupied);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn force_check_while_stopped_is_ignored() {
        let store = Arc::new(InMemoryStore::new());
        let scheduler = scheduler_over(store, quiet_config());
        let mut reports = scheduler.subscribe_reports();
        scheduler.force_check();
        assert!(matches!(reports.try_recv(), Err(broadcast::error::TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn start_twice_keeps_one_loop() {
        let store = Arc::new(InMemoryStore::with_records(vec![], vec![]));
        let mut scheduler = scheduler_over(store.clone(), quiet_config());
        scheduler.start();
        scheduler.start();
        tokio::task::yield_now().await;
        assert_eq!(store.subscriber_count(), 2);
        scheduler.stop().await;
    }
}
