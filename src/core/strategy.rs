use crate::core::{
    ConnectionId, Plugin, PluginCoordinator, PluginError, RecordHandle, Result, RunMode,
};

/// Lifecycle of one plugin run.
///
/// `Failed` is absorbing: once entered, no lifecycle hook runs again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    Initializing,
    Processing,
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Maps host callbacks to coordinator actions. Chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStrategy {
    FullRun,
    MetadataOnly,
}

impl CallbackStrategy {
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Full => Self::FullRun,
            RunMode::MetadataOnly => Self::MetadataOnly,
        }
    }

    pub(crate) fn connection_initialized<P: Plugin>(self, run: &mut PluginCoordinator<P>) {
        if run.state() != RunState::Created || !run.all_connections_initialized() {
            return;
        }

        run.set_state(RunState::Initializing);
        let outcome = run.run_initialize();
        run.settle(outcome, RunState::Processing);
    }

    pub(crate) fn record_received<P: Plugin>(
        self,
        run: &mut PluginCoordinator<P>,
        id: ConnectionId,
        handle: RecordHandle,
    ) -> Result<()> {
        if self == Self::MetadataOnly {
            return Err(PluginError::InvalidMode(format!(
                "record received on connection {id} during a metadata-only run"
            )));
        }
        if run.failure_occurred() {
            return Ok(());
        }

        let pending = run.ingest(id, handle)?;
        tracing::trace!(connection = %id, pending, "record received");

        let Some(limit) = run.context().record_batch_size().limit() else {
            return Ok(());
        };
        if pending >= limit && run.state() == RunState::Processing {
            let outcome = run.run_process_batch();
            run.settle(outcome, RunState::Processing);
        }
        Ok(())
    }

    pub(crate) fn connection_closed<P: Plugin>(self, run: &mut PluginCoordinator<P>) {
        if run.state() != RunState::Processing || !run.all_connections_closed() {
            return;
        }

        run.set_state(RunState::Finalizing);
        let outcome = match self {
            Self::FullRun => drain_and_finalize(run),
            Self::MetadataOnly => run.run_close_outputs(),
        };
        run.settle(outcome, RunState::Done);
    }
}

fn drain_and_finalize<P: Plugin>(run: &mut PluginCoordinator<P>) -> anyhow::Result<()> {
    run.run_process_batch()?;
    run.run_finalize()?;
    run.run_close_outputs()
}
