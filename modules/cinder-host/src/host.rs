use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use cinder_common::Config;
use cinder_dispatch::{Dispatcher, PumpReport};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Owns the dispatcher for the lifetime of the application.
///
/// `init` → (`run_callbacks` | `run`) → `shutdown`. The dispatcher itself has
/// no thread or timer; the host supplies the cadence.
pub struct Host {
    config: Config,
    dispatcher: Option<Arc<Dispatcher>>,
}

impl Host {
    /// Rejects configs that fail [`Config::validate`], such as a zero pump
    /// interval built in code rather than loaded from a file.
    pub fn new(config: Config) -> Result<Self> {
        config.validate().context("Invalid host config")?;
        Ok(Self {
            config,
            dispatcher: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the dispatcher. Calling this on a running host is a no-op that
    /// returns the existing instance.
    pub fn init(&mut self) -> Arc<Dispatcher> {
        if let Some(dispatcher) = &self.dispatcher {
            debug!("Host already initialized");
            return Arc::clone(dispatcher);
        }

        let dispatcher = Arc::new(Dispatcher::new(self.config.dispatch.clone()));
        info!(
            catch_panics = self.config.dispatch.catch_panics,
            retention = ?self.config.dispatch.call_result_retention,
            pump_interval_ms = self.config.host.pump_interval_ms,
            "Host initialized"
        );
        self.dispatcher = Some(Arc::clone(&dispatcher));
        dispatcher
    }

    pub fn is_running(&self) -> bool {
        self.dispatcher.is_some()
    }

    pub fn dispatcher(&self) -> Option<&Arc<Dispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Pump once, delivering everything queued for either scope.
    pub fn run_callbacks(&self) -> PumpReport {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.pump(),
            None => {
                warn!("run_callbacks called before init");
                PumpReport::default()
            }
        }
    }

    /// Pump every `host.pump_interval_ms` until `shutdown` resolves, then pump
    /// one last time so nothing posted before the signal is left behind.
    ///
    /// Subscribers run on the task driving this future, so they should not
    /// block for long.
    pub async fn run<F>(&self, shutdown: F) -> Result<PumpReport>
    where
        F: Future<Output = ()>,
    {
        let dispatcher = self
            .dispatcher
            .clone()
            .context("Host must be initialized before running")?;

        let mut ticker = time::interval(self.config.host.pump_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut totals = PumpReport::default();
        let mut pumps: u64 = 0;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    totals += dispatcher.pump();
                    pumps += 1;
                }
            }
        }
        totals += dispatcher.pump();

        info!(
            pumps,
            delivered = totals.delivered,
            orphaned = totals.orphaned,
            panicked = totals.panicked,
            "Pump loop stopped"
        );
        Ok(totals)
    }

    /// Release the dispatcher. Entries still queued are discarded; the count
    /// is returned. Components holding their own `Arc` keep a working, but no
    /// longer pumped, instance.
    pub fn shutdown(&mut self) -> usize {
        let Some(dispatcher) = self.dispatcher.take() else {
            debug!("Host already shut down");
            return 0;
        };

        let discarded = dispatcher.clear_pending();
        let stats = dispatcher.stats();
        info!(
            discarded,
            events_posted = stats.events_posted,
            call_results_posted = stats.call_results_posted,
            delivered = stats.delivered,
            orphaned = stats.orphaned,
            panicked = stats.panicked,
            "Host shut down"
        );
        discarded
    }
}
