//! Builder assembling the single-writer manager, the worker pools and the
//! dispatcher into one owned [`Core`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use crate::config::DispatcherSettings;
use crate::core::{AppResult, SyncMapUint};
use crate::manager::{SyncOps, SyncUintHandle};
use crate::scheduler::{Dispatcher, JobEntry, JobSchedule, WorkerPools};

/// Registry label for in-flight job entries.
pub const JOB_QUEUE_MAP: &str = "job_queue";
/// Registry label for recurring schedules.
pub const JOB_SCHEDULES_MAP: &str = "job_schedules";

/// Fluent construction of a [`Core`].
///
/// ```
/// use fetcharr_core::builders::CoreBuilder;
///
/// let core = CoreBuilder::new().build().unwrap();
/// core.shutdown();
/// ```
#[derive(Debug, Default)]
pub struct CoreBuilder {
    settings: DispatcherSettings,
}

impl CoreBuilder {
    /// Builder over default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the settings wholesale.
    #[must_use]
    pub fn settings(mut self, settings: DispatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Load settings from a JSON document, keeping defaults for absent
    /// fields.
    ///
    /// # Errors
    ///
    /// Fails when the document does not parse or a value is out of range.
    pub fn settings_json(mut self, input: &str) -> AppResult<Self> {
        self.settings = DispatcherSettings::from_json_str(input)
            .map_err(|e| anyhow::anyhow!(e))
            .context("loading dispatcher settings")?;
        Ok(self)
    }

    /// Validate the settings and start the manager, pools and dispatcher.
    ///
    /// # Errors
    ///
    /// Fails on invalid settings or when registry registration fails.
    pub fn build(self) -> AppResult<Core> {
        self.settings
            .validate()
            .map_err(|e| anyhow::anyhow!(e))
            .context("validating dispatcher settings")?;

        let sync_ops = Arc::new(SyncOps::with_queue_depth(self.settings.ops_queue_depth));
        let queue = sync_ops
            .register_uint_map(JOB_QUEUE_MAP, SyncMapUint::new())
            .context("registering job queue map")?;
        let schedules = sync_ops
            .register_uint_map(JOB_SCHEDULES_MAP, SyncMapUint::new())
            .context("registering job schedules map")?;

        let pools = Arc::new(WorkerPools::start(
            &self.settings.pools,
            Duration::from_secs(self.settings.shutdown_timeout_secs),
        ));
        let dispatcher = Dispatcher::start(&self.settings, pools, queue.clone(), schedules.clone());
        info!("scheduling core assembled");
        Ok(Core {
            sync_ops,
            dispatcher,
            queue,
            schedules,
        })
    }
}

/// The assembled scheduling core: one manager, five pools, one dispatcher.
/// Shut down in dependency order via [`Core::shutdown`].
pub struct Core {
    sync_ops: Arc<SyncOps>,
    dispatcher: Dispatcher,
    queue: SyncUintHandle<JobEntry>,
    schedules: SyncUintHandle<JobSchedule>,
}

impl Core {
    /// The dispatcher, for registering and submitting jobs.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The single-writer manager, for registering additional maps.
    #[must_use]
    pub fn sync_ops(&self) -> &Arc<SyncOps> {
        &self.sync_ops
    }

    /// Handle on the job queue registry.
    #[must_use]
    pub fn queue(&self) -> &SyncUintHandle<JobEntry> {
        &self.queue
    }

    /// Handle on the schedule registry.
    #[must_use]
    pub fn schedules(&self) -> &SyncUintHandle<JobSchedule> {
        &self.schedules
    }

    /// Stop the dispatcher and pools first, then the manager, so in-flight
    /// completion bookkeeping still reaches the writer.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        self.sync_ops.shutdown();
    }
}
