use super::{parse_duration, parse_period, Service};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(clap::Args, Clone, Debug)]
pub struct SchedulerConfig {
    /// How often all Alertmanagers are collected.
    #[clap(
        long,
        env = "UPDATE_INTERVAL",
        default_value = "1m",
        value_parser = parse_period,
        help_heading = "Collection"
    )]
    pub update_interval: Duration,

    /// Maximum number of Alertmanagers collected at the same time.
    #[clap(
        long,
        env = "MAX_CONCURRENT_PULLS",
        default_value = "8",
        help_heading = "Collection"
    )]
    pub max_concurrent_pulls: usize,

    /// Upper bound of the random delay before each Alertmanager is collected
    /// for the first time.
    #[clap(
        long,
        env = "STARTUP_JITTER",
        default_value = "2s",
        value_parser = parse_duration,
        help_heading = "Collection"
    )]
    pub startup_jitter: Duration,
}

#[cfg(test)]
impl SchedulerConfig {
    pub fn new_test_config() -> Self {
        Self {
            update_interval: Duration::from_millis(100),
            max_concurrent_pulls: 2,
            startup_jitter: Duration::ZERO,
        }
    }
}

/// Collects all Alertmanagers on every tick until `cancel` fires.
///
/// An Alertmanager whose previous cycle is still running is skipped for that
/// tick. On cancellation no new cycles are started, in-flight cycles abort at
/// their next I/O boundary and are awaited before returning.
pub async fn run_scheduler(service: Service, config: SchedulerConfig, cancel: CancellationToken) {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_pulls.max(1)));
    let mut in_flight: HashMap<String, JoinHandle<()>> = HashMap::new();

    let mut ticker = tokio::time::interval(config.update_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        upstreams = service.upstreams.len(),
        interval = ?config.update_interval,
        "Starting collection scheduler"
    );

    let mut first_tick = true;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        for upstream in service.upstreams.upstreams() {
            if let Some(handle) = in_flight.get(upstream.name()) {
                if !handle.is_finished() {
                    debug!(alertmanager = upstream.name(), "Previous collection still running, skipping");
                    continue;
                }
            }

            let jitter = if first_tick && !config.startup_jitter.is_zero() {
                rand::thread_rng().gen_range(Duration::ZERO..config.startup_jitter)
            } else {
                Duration::ZERO
            };

            let name = upstream.name().to_owned();
            let upstream = upstream.clone();
            let context = service.context.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(jitter) => {}
                }

                let _permit = tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };

                // Failures are logged and counted by the poller itself.
                let _ = upstream.pull(&context, &cancel).await;
            });

            in_flight.insert(name, handle);
        }

        first_tick = false;
    }

    info!("Stopping collection scheduler");
    for (name, handle) in in_flight {
        if let Err(err) = handle.await {
            warn!(alertmanager = %name, %err, "Collection task failed");
        }
    }
}
