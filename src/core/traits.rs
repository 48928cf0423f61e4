use crate::core::{PluginContext, Record, Result, Schema};

/// Outbound side of one output anchor, owned by the host engine.
pub trait OutputAnchorHost {
    /// Announces the anchor's schema downstream.
    fn init(&mut self, schema: &Schema) -> Result<()>;

    fn push_record(&mut self, record: &Record, is_final: bool) -> Result<()>;

    fn update_progress(&mut self, percent: f64);

    fn close(&mut self) -> Result<()>;
}

/// Tool-level services the host engine offers to a plugin.
pub trait EngineHost {
    fn output_anchor(&mut self, name: &str) -> Result<Box<dyn OutputAnchorHost>>;

    fn report_error(&mut self, message: &str);

    fn report_info(&mut self, message: &str);

    fn report_progress(&mut self, percent: f64);
}

/// User-supplied batch processing logic.
///
/// Every hook defaults to a successful no-op. Errors returned from a hook are
/// caught by the coordinator and end the run; they never reach the host.
pub trait Plugin {
    fn tool_name(&self) -> &str;

    /// Runs once every input connection is initialized.
    ///
    /// Returning `Ok(false)` signals a fatal configuration problem and fails
    /// the run exactly like an error would.
    fn initialize(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Consumes the records currently buffered on the input connections.
    /// Input buffers are cleared after this returns successfully.
    fn process_batch(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs once after the last batch, before the output anchors close.
    fn finalize(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        Ok(())
    }
}
