#![allow(dead_code)]

use anchorflow::{
    ConnectionId, DataType, EngineHost, Field, OutputAnchorHost, Plugin, PluginConfig,
    PluginContext, PluginCoordinator, Record, Result, Schema,
};
use anyhow::bail;
use serde_json::json;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Metadata { anchor: String, fields: usize },
    Record { anchor: String, record: Record, is_final: bool },
    AnchorProgress { anchor: String, percent: f64 },
    Close { anchor: String },
    Error(String),
    Info(String),
    Progress(f64),
}

/// Host engine double that records every outbound call in order.
#[derive(Clone, Default)]
pub struct RecordingHost {
    calls: Rc<RefCell<Vec<HostCall>>>,
}

impl RecordingHost {
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    pub fn closes(&self, anchor: &str) -> usize {
        self.count(|c| matches!(c, HostCall::Close { anchor: a } if a == anchor))
    }

    pub fn errors(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                HostCall::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pushed(&self, anchor: &str) -> Vec<Record> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                HostCall::Record { anchor: a, record, .. } if a == anchor => Some(record.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, pred: impl Fn(&HostCall) -> bool) -> Option<usize> {
        self.calls.borrow().iter().position(|c| pred(c))
    }
}

struct RecordingAnchor {
    name: String,
    calls: Rc<RefCell<Vec<HostCall>>>,
}

impl OutputAnchorHost for RecordingAnchor {
    fn init(&mut self, schema: &Schema) -> Result<()> {
        self.calls.borrow_mut().push(HostCall::Metadata {
            anchor: self.name.clone(),
            fields: schema.len(),
        });
        Ok(())
    }

    fn push_record(&mut self, record: &Record, is_final: bool) -> Result<()> {
        self.calls.borrow_mut().push(HostCall::Record {
            anchor: self.name.clone(),
            record: record.clone(),
            is_final,
        });
        Ok(())
    }

    fn update_progress(&mut self, percent: f64) {
        self.calls.borrow_mut().push(HostCall::AnchorProgress {
            anchor: self.name.clone(),
            percent,
        });
    }

    fn close(&mut self) -> Result<()> {
        self.calls.borrow_mut().push(HostCall::Close {
            anchor: self.name.clone(),
        });
        Ok(())
    }
}

impl EngineHost for RecordingHost {
    fn output_anchor(&mut self, name: &str) -> Result<Box<dyn OutputAnchorHost>> {
        Ok(Box::new(RecordingAnchor {
            name: name.to_string(),
            calls: Rc::clone(&self.calls),
        }))
    }

    fn report_error(&mut self, message: &str) {
        self.calls.borrow_mut().push(HostCall::Error(message.to_string()));
    }

    fn report_info(&mut self, message: &str) {
        self.calls.borrow_mut().push(HostCall::Info(message.to_string()));
    }

    fn report_progress(&mut self, percent: f64) {
        self.calls.borrow_mut().push(HostCall::Progress(percent));
    }
}

/// How often each hook ran, and how many input records each batch saw.
#[derive(Debug, Default)]
pub struct Tally {
    pub initialized: u32,
    pub batches: Vec<usize>,
    pub finalized: u32,
}

/// Test plugin with scriptable failures. When `echo` is set it mirrors the
/// first input connection onto every output anchor.
#[derive(Default)]
pub struct Scripted {
    pub tally: Rc<RefCell<Tally>>,
    pub refuse_init: bool,
    pub fail_batch: Option<usize>,
    pub fail_finalize: bool,
    pub echo: bool,
}

impl Scripted {
    pub fn tally(&self) -> Rc<RefCell<Tally>> {
        Rc::clone(&self.tally)
    }
}

impl Plugin for Scripted {
    fn tool_name(&self) -> &str {
        "scripted"
    }

    fn initialize(&mut self, ctx: &mut PluginContext) -> anyhow::Result<bool> {
        self.tally.borrow_mut().initialized += 1;
        if self.refuse_init {
            return Ok(false);
        }
        if self.echo {
            let schema = ctx.input_anchors()[0].connections()[0]
                .schema()
                .cloned()
                .unwrap_or_default();
            let names: Vec<String> = ctx
                .output_anchors()
                .iter()
                .map(|a| a.name().to_string())
                .collect();
            for name in names {
                ctx.get_output_anchor_mut(&name)?.assign_schema(schema.clone())?;
            }
            ctx.push_all_metadata()?;
        }
        Ok(true)
    }

    fn process_batch(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        let pending: usize = ctx
            .input_anchors()
            .iter()
            .flat_map(|a| a.connections())
            .map(|c| c.pending_records())
            .sum();
        let call = {
            let mut tally = self.tally.borrow_mut();
            tally.batches.push(pending);
            tally.batches.len()
        };
        if self.fail_batch == Some(call) {
            bail!("division by zero in row 17 (secret=hunter2)");
        }

        if self.echo {
            let anchor = ctx.input_anchors()[0].name().to_string();
            let records = ctx
                .get_input_anchor_mut(&anchor)?
                .connection_mut(0)?
                .collect_records()?;
            let names: Vec<String> = ctx
                .output_anchors()
                .iter()
                .map(|a| a.name().to_string())
                .collect();
            for name in names {
                let output = ctx.get_output_anchor_mut(&name)?;
                output.buffer_mut()?.extend(records.iter().cloned());
                output.push_records()?;
            }
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.tally.borrow_mut().finalized += 1;
        if self.fail_finalize {
            bail!("could not flush summary");
        }
        ctx.info("finalized");
        Ok(())
    }
}

pub fn schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Integer).required(),
        Field::new("name", DataType::String),
    ])
}

pub fn row(id: i64) -> Record {
    let mut record = Record::new();
    record.set_field("id", json!(id));
    record.set_field("name", json!(format!("row-{id}")));
    record
}

pub fn coordinator(
    plugin: Scripted,
    config: PluginConfig,
) -> (PluginCoordinator<Scripted>, RecordingHost) {
    let host = RecordingHost::default();
    let run = PluginCoordinator::new(plugin, config, Box::new(host.clone()))
        .expect("coordinator should build");
    (run, host)
}

/// Adds `count` connections to "Input" and initializes them all.
pub fn open_connections(run: &mut PluginCoordinator<Scripted>, count: usize) -> Vec<ConnectionId> {
    let ids: Vec<ConnectionId> = (0..count)
        .map(|i| run.add_incoming_connection("Input", &format!("#{}", i + 1)).unwrap())
        .collect();
    for id in &ids {
        run.on_connection_initialized(*id, schema()).unwrap();
    }
    ids
}
