use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use tokio::{task::JoinHandle, time::interval};

pub static METER: Meter = Meter::new();

/// Counters for completed detection passes and fired alerts.
#[derive(Default)]
pub struct Meter {
    passes: AtomicU64,
    alerts: AtomicU64,
}

impl Meter {
    pub const fn new() -> Meter {
        Meter {
            passes: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
        }
    }

    pub fn tick_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_reset_passes(&self) -> u64 {
        self.passes.swap(0, Ordering::Relaxed)
    }

    pub fn get_reset_alerts(&self) -> u64 {
        self.alerts.swap(0, Ordering::Relaxed)
    }
}

pub fn spawn_meter_logger() -> JoinHandle<()> {
    tokio::spawn(async {
        let mut log_interval = interval(Duration::from_secs(2));
        log_interval.tick().await;

        loop {
            let start = Instant::now();
            log_interval.tick().await;

            let passes = METER.get_reset_passes();
            let alerts = METER.get_reset_alerts();
            let elapsed = start.elapsed().as_secs_f32();
            let passes_per_second = passes as f32 / elapsed;

            if passes > 0 {
                log::info!("Detection passes per second: {passes_per_second:.2}")
            }
            if alerts > 0 {
                log::info!("Alerts fired: {alerts}")
            }
        }
    })
}
