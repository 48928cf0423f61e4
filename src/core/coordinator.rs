use crate::core::{
    BatchSize, CallbackStrategy, Connection, ConnectionId, EngineHost, EventHub, EventKind,
    InputAnchor, OutputAnchor, Plugin, PluginConfig, PluginError, PluginEvent, RecordHandle,
    Result, RunMode, RunState, Schema,
};
use anyhow::bail;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub records_received: u64,
    pub batches_processed: u64,
    pub records_pushed: u64,
}

/// Everything a plugin hook may touch: anchors, configuration and the host's
/// diagnostic channel.
pub struct PluginContext {
    tool_name: String,
    config: PluginConfig,
    inputs: Vec<InputAnchor>,
    outputs: Vec<OutputAnchor>,
    engine: Box<dyn EngineHost>,
}

impl PluginContext {
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn run_mode(&self) -> RunMode {
        self.config.run_mode
    }

    pub fn record_batch_size(&self) -> BatchSize {
        self.config.record_batch_size
    }

    pub fn input_anchors(&self) -> &[InputAnchor] {
        &self.inputs
    }

    pub fn output_anchors(&self) -> &[OutputAnchor] {
        &self.outputs
    }

    pub fn get_input_anchor(&self, name: &str) -> Result<&InputAnchor> {
        self.inputs
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| PluginError::not_found("input anchor", name))
    }

    pub fn get_input_anchor_mut(&mut self, name: &str) -> Result<&mut InputAnchor> {
        self.inputs
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| PluginError::not_found("input anchor", name))
    }

    pub fn get_output_anchor(&self, name: &str) -> Result<&OutputAnchor> {
        self.outputs
            .iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| PluginError::not_found("output anchor", name))
    }

    pub fn get_output_anchor_mut(&mut self, name: &str) -> Result<&mut OutputAnchor> {
        self.outputs
            .iter_mut()
            .find(|a| a.name() == name)
            .ok_or_else(|| PluginError::not_found("output anchor", name))
    }

    pub fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.inputs
            .get(id.anchor)
            .and_then(|anchor| anchor.connections().get(id.index))
            .ok_or_else(|| PluginError::not_found("connection", id.to_string()))
    }

    pub fn connection_mut(&mut self, id: ConnectionId) -> Result<&mut Connection> {
        self.inputs
            .get_mut(id.anchor)
            .ok_or_else(|| PluginError::not_found("connection", id.to_string()))?
            .connection_mut(id.index)
    }

    fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.inputs.iter().flat_map(InputAnchor::connections)
    }

    // Evaluated on every call: connection states change between callbacks.
    pub fn all_connections_initialized(&self) -> bool {
        self.connections().all(Connection::is_initialized)
    }

    pub fn all_connections_closed(&self) -> bool {
        self.connections().all(Connection::is_closed)
    }

    pub fn push_all_metadata(&mut self) -> Result<()> {
        self.outputs.iter_mut().try_for_each(OutputAnchor::push_metadata)
    }

    pub fn clear_all_input_records(&mut self) {
        self.inputs
            .iter_mut()
            .flat_map(InputAnchor::connections_mut)
            .for_each(Connection::clear_records);
    }

    pub fn info(&mut self, message: &str) {
        self.engine.report_info(message);
    }

    fn pending_input_records(&self) -> usize {
        self.connections().map(Connection::pending_records).sum()
    }

    fn close_output_anchors(&mut self) -> Result<()> {
        self.outputs.iter_mut().try_for_each(OutputAnchor::close)
    }

    fn forward_progress(&mut self) {
        let (sum, count) = self
            .connections()
            .fold((0.0, 0usize), |(sum, count), c| (sum + c.progress(), count + 1));
        if count == 0 {
            return;
        }
        let percent = sum / count as f64;
        self.engine.report_progress(percent);
        for anchor in &mut self.outputs {
            anchor.report_progress(percent);
        }
    }

    fn sanitized_failure_message(&self) -> String {
        match &self.config.log_path {
            Some(path) => format!(
                "Unexpected error occurred in plugin, please see log file: {}",
                path.display()
            ),
            None => format!(
                "Unexpected error occurred in plugin '{}', see the plugin log for details",
                self.tool_name
            ),
        }
    }
}

/// Drives a [`Plugin`] from the host's per-connection callbacks.
///
/// Host callbacks are routed through the run's [`CallbackStrategy`]. Errors
/// raised by plugin hooks are caught here, reported to the host as a single
/// sanitized message, broadcast as [`EventKind::PluginFailure`] and move the
/// run to [`RunState::Failed`]. Errors returned by the `on_*` methods are
/// contract violations by the caller, not plugin failures.
pub struct PluginCoordinator<P: Plugin> {
    plugin: P,
    ctx: PluginContext,
    strategy: CallbackStrategy,
    state: RunState,
    events: EventHub<EventKind, PluginEvent>,
    stats: RunStats,
}

impl<P: Plugin> PluginCoordinator<P> {
    pub fn new(plugin: P, config: PluginConfig, mut engine: Box<dyn EngineHost>) -> Result<Self> {
        config.validate()?;

        let inputs = config
            .input_anchors
            .iter()
            .map(|spec| InputAnchor::new(spec.name.clone(), spec.optional))
            .collect();
        let outputs = config
            .output_anchors
            .iter()
            .map(|spec| {
                let host = engine.output_anchor(&spec.name)?;
                Ok(OutputAnchor::new(spec.name.clone(), spec.optional, host))
            })
            .collect::<Result<Vec<_>>>()?;

        let strategy = CallbackStrategy::for_mode(config.run_mode);
        let tool_name = plugin.tool_name().to_string();
        tracing::debug!(tool = %tool_name, ?strategy, "plugin coordinator created");

        Ok(Self {
            plugin,
            ctx: PluginContext {
                tool_name,
                config,
                inputs,
                outputs,
                engine,
            },
            strategy,
            state: RunState::Created,
            events: EventHub::new(),
            stats: RunStats::default(),
        })
    }

    pub fn plugin(&self) -> &P {
        &self.plugin
    }

    pub fn plugin_mut(&mut self) -> &mut P {
        &mut self.plugin
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut PluginContext {
        &mut self.ctx
    }

    pub fn strategy(&self) -> CallbackStrategy {
        self.strategy
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn failure_occurred(&self) -> bool {
        self.state == RunState::Failed
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            records_pushed: self.ctx.outputs.iter().map(OutputAnchor::records_pushed).sum(),
            ..self.stats
        }
    }

    pub fn get_input_anchor(&self, name: &str) -> Result<&InputAnchor> {
        self.ctx.get_input_anchor(name)
    }

    pub fn get_output_anchor(&self, name: &str) -> Result<&OutputAnchor> {
        self.ctx.get_output_anchor(name)
    }

    pub fn all_connections_initialized(&self) -> bool {
        self.ctx.all_connections_initialized()
    }

    pub fn all_connections_closed(&self) -> bool {
        self.ctx.all_connections_closed()
    }

    pub fn subscribe<F>(&mut self, kind: EventKind, callback: F)
    where
        F: FnMut(&PluginEvent) -> anyhow::Result<()> + 'static,
    {
        self.events.subscribe(kind, callback);
    }

    pub fn subscribe_all<F>(&mut self, callback: F)
    where
        F: FnMut(&PluginEvent) -> anyhow::Result<()> + 'static,
    {
        self.events.subscribe_all(callback);
    }

    /// Binds a new inbound connection to the named input anchor.
    pub fn add_incoming_connection(
        &mut self,
        anchor_name: &str,
        connection_name: &str,
    ) -> Result<ConnectionId> {
        let anchor = self
            .ctx
            .inputs
            .iter()
            .position(|a| a.name() == anchor_name)
            .ok_or_else(|| PluginError::not_found("input anchor", anchor_name))?;
        if self.state != RunState::Created {
            return Err(PluginError::InvalidState(format!(
                "connection '{connection_name}' added after the run started"
            )));
        }
        let index = self.ctx.inputs[anchor].add_connection(Connection::new(connection_name));
        Ok(ConnectionId { anchor, index })
    }

    pub fn on_connection_initialized(&mut self, id: ConnectionId, schema: Schema) -> Result<()> {
        self.ctx.connection_mut(id)?.mark_initialized(schema)?;
        tracing::trace!(connection = %id, "connection initialized");
        let strategy = self.strategy;
        strategy.connection_initialized(self);
        Ok(())
    }

    pub fn on_record_received(
        &mut self,
        id: ConnectionId,
        record: impl Into<RecordHandle>,
    ) -> Result<()> {
        let strategy = self.strategy;
        strategy.record_received(self, id, record.into())
    }

    pub fn on_connection_closed(&mut self, id: ConnectionId) -> Result<()> {
        self.ctx.connection_mut(id)?.mark_closed()?;
        tracing::trace!(connection = %id, "connection closed");
        let strategy = self.strategy;
        strategy.connection_closed(self);
        Ok(())
    }

    pub fn on_progress(&mut self, id: ConnectionId, percent: f64) -> Result<()> {
        self.ctx.connection_mut(id)?.progress_update(percent)?;
        self.ctx.forward_progress();
        Ok(())
    }

    /// Host-side shutdown. Never fails, whatever state the run is in.
    pub fn shutdown(&mut self) {
        let stats = self.stats();
        if self.state.is_terminal() {
            tracing::info!(
                tool = %self.ctx.tool_name,
                state = ?self.state,
                records = stats.records_received,
                batches = stats.batches_processed,
                pushed = stats.records_pushed,
                "plugin shut down"
            );
        } else {
            tracing::warn!(
                tool = %self.ctx.tool_name,
                state = ?self.state,
                "plugin shut down before the run completed"
            );
        }
    }

    pub(crate) fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    pub(crate) fn ingest(&mut self, id: ConnectionId, handle: RecordHandle) -> Result<usize> {
        let pending = self.ctx.connection_mut(id)?.ingest(handle)?;
        self.stats.records_received += 1;
        Ok(pending)
    }

    pub(crate) fn run_initialize(&mut self) -> anyhow::Result<()> {
        if !self.plugin.initialize(&mut self.ctx)? {
            bail!(
                "plugin '{}' reported a fatal configuration error during initialization",
                self.ctx.tool_name
            );
        }
        tracing::info!(tool = %self.ctx.tool_name, "plugin initialized");
        self.publish(PluginEvent::Initialized)
    }

    pub(crate) fn run_process_batch(&mut self) -> anyhow::Result<()> {
        let records = self.ctx.pending_input_records();
        self.plugin.process_batch(&mut self.ctx)?;
        self.ctx.clear_all_input_records();

        self.stats.batches_processed += 1;
        let batch = self.stats.batches_processed;
        tracing::debug!(tool = %self.ctx.tool_name, batch, records, "batch processed");
        self.publish(PluginEvent::BatchProcessed { batch, records })
    }

    pub(crate) fn run_finalize(&mut self) -> anyhow::Result<()> {
        self.plugin.finalize(&mut self.ctx)
    }

    pub(crate) fn run_close_outputs(&mut self) -> anyhow::Result<()> {
        self.ctx.close_output_anchors()?;
        tracing::info!(
            tool = %self.ctx.tool_name,
            anchors = self.ctx.outputs.len(),
            "output anchors closed"
        );
        self.publish(PluginEvent::Completed {
            batches: self.stats.batches_processed,
        })
    }

    /// Moves to `next` on success, or fails the run.
    pub(crate) fn settle(&mut self, outcome: anyhow::Result<()>, next: RunState) {
        match outcome {
            Ok(()) => self.state = next,
            Err(e) => self.handle_failure(e),
        }
    }

    fn handle_failure(&mut self, error: anyhow::Error) {
        tracing::error!(tool = %self.ctx.tool_name, state = ?self.state, error = ?error, "plugin failed");
        let message = self.ctx.sanitized_failure_message();
        self.ctx.engine.report_error(&message);
        self.state = RunState::Failed;

        let event = PluginEvent::Failure {
            message: format!("{error:#}"),
        };
        if let Err(e) = self.publish(event) {
            tracing::warn!(tool = %self.ctx.tool_name, error = %e, "failure observer raised an error");
        }
    }

    fn publish(&mut self, event: PluginEvent) -> anyhow::Result<()> {
        self.events.notify(&event.kind(), &event)
    }
}
