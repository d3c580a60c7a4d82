//! Liveness reporting while stages run.
//!
//! A heartbeat only observes: it logs what is running and complains once
//! when an activity outlives the timeout. It never cancels anything.

use crate::config::HeartbeatSettings;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receives activity boundaries from the engine.
pub trait Heartbeat: Send + Sync {
    /// An activity labelled `label` begins.
    fn start(&self, label: &str);

    /// The current activity ends; `label` describes how.
    fn stop(&self, label: &str);
}

/// Ignores all activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHeartbeat;

impl Heartbeat for NoOpHeartbeat {
    fn start(&self, _label: &str) {}

    fn stop(&self, _label: &str) {}
}

#[derive(Debug)]
struct Activity {
    label: String,
    started: Instant,
    warned: bool,
}

/// Logs activity from a tokio interval task.
///
/// Dropping the heartbeat stops the task.
#[derive(Debug)]
pub struct TimerHeartbeat {
    settings: HeartbeatSettings,
    current: Arc<Mutex<Option<Activity>>>,
    started: Mutex<Vec<String>>,
    task: JoinHandle<()>,
}

impl TimerHeartbeat {
    /// Spawns the interval task on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(settings: HeartbeatSettings) -> Self {
        let current: Arc<Mutex<Option<Activity>>> = Arc::new(Mutex::new(None));
        let watched = Arc::clone(&current);
        let period = settings.period().max(Duration::from_millis(1));
        let timeout = settings.timeout();

        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                let mut guard = watched.lock();
                let Some(activity) = guard.as_mut() else {
                    continue;
                };
                let elapsed = activity.started.elapsed();
                if elapsed > timeout && !activity.warned {
                    warn!(
                        activity = %activity.label,
                        elapsed_secs = elapsed.as_secs_f64(),
                        timeout_secs = timeout.as_secs_f64(),
                        "Activity exceeded the heartbeat timeout"
                    );
                    activity.warned = true;
                } else {
                    debug!(activity = %activity.label, elapsed_secs = elapsed.as_secs_f64(), "Heartbeat");
                }
            }
        });

        Self {
            settings,
            current,
            started: Mutex::new(Vec::new()),
            task,
        }
    }

    /// The settings the heartbeat runs with.
    #[must_use]
    pub fn settings(&self) -> HeartbeatSettings {
        self.settings
    }

    /// Label of the running activity, if any.
    #[must_use]
    pub fn current_label(&self) -> Option<String> {
        self.current.lock().as_ref().map(|activity| activity.label.clone())
    }

    /// Labels of every activity started so far, in order.
    #[must_use]
    pub fn started_labels(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    /// Returns true if the running activity has outlived the timeout.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|activity| activity.started.elapsed() > self.settings.timeout())
    }
}

impl Heartbeat for TimerHeartbeat {
    fn start(&self, label: &str) {
        info!("{label}");
        self.started.lock().push(label.to_string());
        *self.current.lock() = Some(Activity {
            label: label.to_string(),
            started: Instant::now(),
            warned: false,
        });
    }

    fn stop(&self, label: &str) {
        match self.current.lock().take() {
            Some(activity) => {
                info!(
                    finished = %activity.label,
                    elapsed_secs = activity.started.elapsed().as_secs_f64(),
                    "{label}"
                );
            }
            None => info!("{label}"),
        }
    }
}

impl Drop for TimerHeartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_stop_tracks_activity() {
        let heartbeat = TimerHeartbeat::spawn(HeartbeatSettings::new(0.01, 60.0));

        heartbeat.start("Running Coaddition");
        assert_eq!(heartbeat.current_label().as_deref(), Some("Running Coaddition"));
        assert!(!heartbeat.timed_out());

        heartbeat.stop("Step Coaddition finished.");
        assert!(heartbeat.current_label().is_none());
        assert_eq!(heartbeat.started_labels(), vec!["Running Coaddition".to_string()]);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_not_enforced() {
        let heartbeat = TimerHeartbeat::spawn(HeartbeatSettings::new(0.01, 0.02));
        heartbeat.start("Running Photometry");
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(heartbeat.timed_out());
        assert_eq!(heartbeat.current_label().as_deref(), Some("Running Photometry"));
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let heartbeat = TimerHeartbeat::spawn(HeartbeatSettings::default());
        let task = heartbeat.task.abort_handle();
        drop(heartbeat);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(task.is_finished());
    }
}
