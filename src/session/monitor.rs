//! Activity monitor
//!
//! Periodic task that samples the input and output level taps and feeds them
//! to the ambient effect. At most one task runs per monitor: starting again
//! cancels the previous task first.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::dsp::LevelTap;
use crate::session::ambient::AmbientEffect;

/// Default sampling period
pub const DEFAULT_MONITOR_PERIOD_MS: u64 = 100;

/// Owner of the periodic sampling task
#[derive(Debug)]
pub struct ActivityMonitor {
    period: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityMonitor {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start sampling `input` and `output` into `effect`
    ///
    /// Any task already running is cancelled first. Must be called from
    /// within a tokio runtime.
    pub fn start(&self, effect: Arc<Mutex<AmbientEffect>>, input: LevelTap, output: LevelTap) {
        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("previous activity monitor cancelled");
        }

        let period = self.period;
        let dt_ms = period.as_secs_f64() * 1000.0;
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                sample_once(&effect, &input, &output, dt_ms);
            }
        }));
        debug!(period_ms = dt_ms, "activity monitor started");
    }

    /// Cancel the running task
    ///
    /// # Returns
    /// false if no task was running
    pub fn stop(&self) -> bool {
        match self.task.lock().take() {
            Some(task) => {
                task.abort();
                debug!("activity monitor stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_MONITOR_PERIOD_MS))
    }
}

impl Drop for ActivityMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// One monitor tick: input sample first, then output sample
pub fn sample_once(
    effect: &Mutex<AmbientEffect>,
    input: &LevelTap,
    output: &LevelTap,
    dt_ms: f64,
) {
    let input_db = input.level_db();
    let output_db = output.level_db();
    trace!(input_db, output_db, "activity sample");

    let mut effect = effect.lock();
    effect.feed_input(input_db);
    effect.feed_output(output_db, dt_ms);
}
