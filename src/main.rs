use anchorflow::{BatchSize, Pipeline, Plugin, PluginConfig, PluginContext};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

/// Copies every input record to the output anchor, one batch at a time.
struct Passthrough;

impl Plugin for Passthrough {
    fn tool_name(&self) -> &str {
        "passthrough"
    }

    fn initialize(&mut self, ctx: &mut PluginContext) -> anyhow::Result<bool> {
        let input = ctx.get_input_anchor("Input")?;
        let Some(schema) = input.connections().first().and_then(|c| c.schema()).cloned() else {
            return Ok(false);
        };

        ctx.get_output_anchor_mut("Output")?.assign_schema(schema)?;
        ctx.push_all_metadata()?;
        ctx.info("Plugin initialized.");
        Ok(true)
    }

    fn process_batch(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        let records = ctx.get_input_anchor_mut("Input")?.connection_mut(0)?.collect_records()?;
        let output = ctx.get_output_anchor_mut("Output")?;
        output.buffer_mut()?.extend(records);
        output.push_records()?;
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        ctx.info("Completed processing records.");
        Ok(())
    }
}

fn init_logging(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_logging("info");

    let mut args = std::env::args().skip(1);
    let input = args.next().unwrap_or_else(|| "input.csv".to_string());
    let output_dir = args.next().unwrap_or_else(|| "out".to_string());

    let config = PluginConfig::new()
        .with_input("Input")
        .with_output("Output")
        .with_batch_size(BatchSize::records(10_000));

    let mut pipeline = Pipeline::new(Passthrough, config, &output_dir)?;
    pipeline
        .connect("Input", &input)
        .with_context(|| format!("failed to open {input}"))?;
    let stats = pipeline.run()?;

    if pipeline.coordinator().failure_occurred() {
        anyhow::bail!("plugin run failed, see log output above");
    }
    println!(
        "Wrote {} records in {} batches to {}/Output.jsonl",
        stats.records_pushed, stats.batches_processed, output_dir
    );
    Ok(())
}
