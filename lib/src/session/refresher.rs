// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Background device status polling

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard, Weak,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use ledger_dmk_core::{DeviceModel, DeviceStatus};

use super::options::RefresherOptions;

/// Target polled by the refresher
#[async_trait]
pub(crate) trait RefreshTarget: Send + Sync {
    /// Current device status
    fn device_status(&self) -> DeviceStatus;

    /// Whether any blockers are held
    fn is_blocked(&self) -> bool;

    /// Issue a single status probe and fold its result into session state
    async fn refresh(&self);
}

/// Compute the effective polling interval for a requested interval
///
/// Returns the interval and whether the request was below the model floor.
pub fn effective_interval(options: &RefresherOptions, floor: Duration) -> (Duration, bool) {
    let corrected = options.polling_interval < floor;
    let base = options.polling_interval.max(floor);

    (base * options.interval_multiplier.max(1), corrected)
}

/// Timer loop issuing status probes while no blockers are held
pub struct Refresher {
    options: RefresherOptions,
    floor: Duration,
    interval: Duration,
    warned: AtomicBool,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Refresher {
    pub fn new(options: RefresherOptions, model: &DeviceModel) -> Self {
        let (interval, _) = effective_interval(&options, model.polling_floor);

        Self {
            options,
            floor: model.polling_floor,
            interval,
            warned: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<(CancellationToken, JoinHandle<()>)>> {
        match self.task.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    /// Effective interval between ticks
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check whether the timer loop is running
    pub fn is_running(&self) -> bool {
        match self.lock().as_ref() {
            Some((token, handle)) => !token.is_cancelled() && !handle.is_finished(),
            None => false,
        }
    }

    /// Start the timer loop, no-op if disabled or already running
    pub(crate) fn start(&self, target: Weak<dyn RefreshTarget>) {
        if !self.options.enabled {
            return;
        }

        let mut task = self.lock();
        if let Some((token, handle)) = task.as_ref() {
            if !token.is_cancelled() && !handle.is_finished() {
                return;
            }
        }

        if self.options.polling_interval < self.floor && !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "Polling interval {:?} below device minimum, using {:?}",
                self.options.polling_interval, self.floor
            );
        }

        debug!("Starting refresher (interval: {:?})", self.interval);

        let token = CancellationToken::new();
        let handle = tokio::spawn(run(target, self.interval, token.clone()));

        *task = Some((token, handle));
    }

    /// Stop the timer loop, an in-flight probe is allowed to complete
    pub fn stop(&self) {
        if let Some((token, _handle)) = self.lock().take() {
            debug!("Stopping refresher");
            token.cancel();
        }
    }

    /// Stop then immediately start the timer loop
    pub(crate) fn restart(&self, target: Weak<dyn RefreshTarget>) {
        self.stop();
        self.start(target);
    }
}

impl Drop for Refresher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(target: Weak<dyn RefreshTarget>, interval: Duration, token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => (),
        }

        let t = match target.upgrade() {
            Some(t) => t,
            None => break,
        };

        match t.device_status() {
            DeviceStatus::NotConnected => {
                debug!("Device disconnected, stopping refresher");
                break;
            }
            DeviceStatus::Busy => continue,
            _ => (),
        }

        if t.is_blocked() {
            continue;
        }

        t.refresh().await;
    }
}

#[cfg(test)]
mod test {
    use std::{
        cell::RefCell,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Once,
        },
    };

    use log::{Level, LevelFilter, Log, Metadata, Record};

    use ledger_dmk_core::DeviceModelId;

    use super::*;

    thread_local! {
        static RECORDS: RefCell<Vec<(Level, String)>> = RefCell::new(Vec::new());
    }

    /// Logger collecting records emitted on the current thread
    struct Capture;

    impl Log for Capture {
        fn enabled(&self, m: &Metadata) -> bool {
            m.level() <= Level::Warn
        }

        fn log(&self, r: &Record) {
            if self.enabled(r.metadata()) {
                RECORDS.with(|c| c.borrow_mut().push((r.level(), r.args().to_string())));
            }
        }

        fn flush(&self) {}
    }

    static CAPTURE: Capture = Capture;
    static INIT: Once = Once::new();

    fn capture_logs() {
        INIT.call_once(|| {
            if log::set_logger(&CAPTURE).is_ok() {
                log::set_max_level(LevelFilter::Warn);
            }
        });
        RECORDS.with(|c| c.borrow_mut().clear());
    }

    fn warnings() -> Vec<String> {
        RECORDS.with(|c| {
            c.borrow()
                .iter()
                .filter(|(l, _)| *l == Level::Warn)
                .map(|(_, m)| m.clone())
                .collect()
        })
    }

    struct Counter {
        ticks: AtomicUsize,
        blocked: AtomicBool,
        status: Mutex<DeviceStatus>,
    }

    impl Counter {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                ticks: AtomicUsize::new(0),
                blocked: AtomicBool::new(false),
                status: Mutex::new(DeviceStatus::Connected),
            })
        }

        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RefreshTarget for Counter {
        fn device_status(&self) -> DeviceStatus {
            *self.status.lock().unwrap()
        }

        fn is_blocked(&self) -> bool {
            self.blocked.load(Ordering::SeqCst)
        }

        async fn refresh(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn weak(c: &Arc<Counter>) -> Weak<dyn RefreshTarget> {
        let t: Arc<dyn RefreshTarget> = c.clone();
        Arc::downgrade(&t)
    }

    /// Advance paused time in small steps so spawned tasks observe each tick
    async fn advance(d: Duration) {
        let step = Duration::from_millis(100);
        let mut t = Duration::ZERO;
        while t < d {
            tokio::time::advance(step).await;
            tokio::task::yield_now().await;
            t += step;
        }
    }

    #[test]
    fn interval_clamped_to_floor() {
        let nano_x = DeviceModel::info(DeviceModelId::NanoX);
        let nano_s = DeviceModel::info(DeviceModelId::NanoS);

        let o = RefresherOptions {
            polling_interval: nano_x.polling_floor - Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(
            effective_interval(&o, nano_x.polling_floor),
            (nano_x.polling_floor * 2, true)
        );
        assert_eq!(
            effective_interval(&o, nano_s.polling_floor),
            (Duration::from_millis(4000), true)
        );

        let o = RefresherOptions {
            polling_interval: Duration::from_millis(1500),
            interval_multiplier: 3,
            ..Default::default()
        };
        assert_eq!(
            effective_interval(&o, nano_x.polling_floor),
            (Duration::from_millis(4500), false)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_interval() {
        let c = Counter::new();
        let o = RefresherOptions {
            polling_interval: Duration::from_millis(900),
            ..Default::default()
        };
        let r = Refresher::new(o, &DeviceModel::info(DeviceModelId::NanoX));
        assert_eq!(r.interval(), Duration::from_millis(2000));

        r.start(weak(&c));
        assert!(r.is_running());

        advance(Duration::from_millis(1900)).await;
        assert_eq!(c.ticks(), 0);

        advance(Duration::from_millis(200)).await;
        assert_eq!(c.ticks(), 1);

        advance(Duration::from_millis(2000)).await;
        assert_eq!(c.ticks(), 2);

        r.stop();
        advance(Duration::from_millis(6000)).await;
        assert_eq!(c.ticks(), 2);
        assert!(!r.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn skips_blocked_and_busy() {
        let c = Counter::new();
        let r = Refresher::new(RefresherOptions::default(), &DeviceModel::info(DeviceModelId::NanoX));
        r.start(weak(&c));

        c.blocked.store(true, Ordering::SeqCst);
        advance(Duration::from_millis(6100)).await;
        assert_eq!(c.ticks(), 0);

        c.blocked.store(false, Ordering::SeqCst);
        *c.status.lock().unwrap() = DeviceStatus::Busy;
        advance(Duration::from_millis(4000)).await;
        assert_eq!(c.ticks(), 0);

        *c.status.lock().unwrap() = DeviceStatus::Locked;
        advance(Duration::from_millis(2000)).await;
        assert_eq!(c.ticks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_disconnected() {
        let c = Counter::new();
        let r = Refresher::new(RefresherOptions::default(), &DeviceModel::info(DeviceModelId::NanoX));
        r.start(weak(&c));

        *c.status.lock().unwrap() = DeviceStatus::NotConnected;
        advance(Duration::from_millis(2100)).await;

        assert_eq!(c.ticks(), 0);
        assert!(!r.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn start_stop_idempotent() {
        let c = Counter::new();
        let r = Refresher::new(RefresherOptions::default(), &DeviceModel::info(DeviceModelId::NanoX));

        // Restart from stopped
        r.stop();
        r.restart(weak(&c));
        r.start(weak(&c));
        assert!(r.is_running());

        advance(Duration::from_millis(2100)).await;
        assert_eq!(c.ticks(), 1);

        r.stop();
        r.stop();
        assert!(!r.is_running());

        // Disabled refreshers never start
        let o = RefresherOptions {
            enabled: false,
            ..Default::default()
        };
        let r = Refresher::new(o, &DeviceModel::info(DeviceModelId::NanoX));
        r.start(weak(&c));
        assert!(!r.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn warns_once_below_floor() {
        capture_logs();

        let c = Counter::new();
        let o = RefresherOptions {
            polling_interval: Duration::from_millis(200),
            ..Default::default()
        };
        let r = Refresher::new(o, &DeviceModel::info(DeviceModelId::NanoX));
        assert_eq!(r.interval(), Duration::from_millis(2000));

        r.start(weak(&c));
        for _ in 0..3 {
            r.restart(weak(&c));
            r.stop();
            r.start(weak(&c));
        }
        r.stop();

        let w = warnings();
        assert_eq!(w.len(), 1, "warnings: {w:?}");
        assert!(w[0].contains("below device minimum"));
    }

    #[tokio::test(start_paused = true)]
    async fn no_warning_above_floor() {
        capture_logs();

        let c = Counter::new();
        let r = Refresher::new(RefresherOptions::default(), &DeviceModel::info(DeviceModelId::NanoX));
        r.start(weak(&c));
        r.restart(weak(&c));
        r.stop();

        assert!(warnings().is_empty());
    }
}
