use crate::core::{
    Connection, OutputAnchorHost, PluginError, Record, RecordBuffer, RecordHandle, Result, Schema,
};
use std::fmt;

/// Named attachment point collecting any number of inbound connections.
#[derive(Debug)]
pub struct InputAnchor {
    name: String,
    optional: bool,
    connections: Vec<Connection>,
}

impl InputAnchor {
    pub fn new(name: impl Into<String>, optional: bool) -> Self {
        Self {
            name: name.into(),
            optional,
            connections: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut [Connection] {
        &mut self.connections
    }

    pub fn connection_mut(&mut self, index: usize) -> Result<&mut Connection> {
        let anchor = &self.name;
        self.connections
            .get_mut(index)
            .ok_or_else(|| PluginError::not_found("connection", format!("{anchor}#{index}")))
    }

    pub(crate) fn add_connection(&mut self, connection: Connection) -> usize {
        self.connections.push(connection);
        self.connections.len() - 1
    }
}

/// One-way gate guarding the output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataState {
    Unpushed,
    Pushed,
}

pub struct OutputAnchor {
    name: String,
    optional: bool,
    host: Box<dyn OutputAnchorHost>,
    metadata: MetadataState,
    staged: Option<RecordBuffer>,
    closed: bool,
    records_pushed: u64,
}

impl OutputAnchor {
    pub fn new(name: impl Into<String>, optional: bool, host: Box<dyn OutputAnchorHost>) -> Self {
        Self {
            name: name.into(),
            optional,
            host,
            metadata: MetadataState::Unpushed,
            staged: None,
            closed: false,
            records_pushed: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.staged.as_ref().map(RecordBuffer::schema)
    }

    pub fn metadata_state(&self) -> MetadataState {
        self.metadata
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn records_pushed(&self) -> u64 {
        self.records_pushed
    }

    /// Binds the anchor to `schema`, replacing any staged records.
    pub fn assign_schema(&mut self, schema: Schema) -> Result<()> {
        if self.metadata == MetadataState::Pushed {
            return Err(PluginError::InvalidState(format!(
                "schema of output anchor '{}' is fixed once metadata is pushed",
                self.name
            )));
        }
        self.staged = Some(RecordBuffer::new(schema));
        Ok(())
    }

    /// Records staged for the next push.
    pub fn buffer_mut(&mut self) -> Result<&mut RecordBuffer> {
        let name = &self.name;
        self.staged.as_mut().ok_or_else(|| {
            PluginError::Precondition(format!(
                "output anchor '{name}' needs a schema before records can be staged"
            ))
        })
    }

    pub fn stage(&mut self, record: impl Into<RecordHandle>) -> Result<()> {
        self.buffer_mut()?.append(record);
        Ok(())
    }

    /// Sends the schema downstream. Repeated calls do nothing.
    pub fn push_metadata(&mut self) -> Result<()> {
        let Some(staged) = &self.staged else {
            return Err(PluginError::Precondition(format!(
                "output anchor '{}' has no schema to push",
                self.name
            )));
        };
        if self.metadata == MetadataState::Pushed {
            return Ok(());
        }

        self.host.init(staged.schema())?;
        self.metadata = MetadataState::Pushed;
        tracing::debug!(anchor = %self.name, "output metadata pushed");
        Ok(())
    }

    /// Forwards every staged record downstream in order, then empties the buffer.
    ///
    /// All records are checked against the schema before the first one is sent.
    /// If the host rejects a record midway, the records it already accepted are
    /// dropped and the rest stay staged.
    pub fn push_records(&mut self) -> Result<()> {
        if self.metadata != MetadataState::Pushed {
            return Err(PluginError::Precondition(format!(
                "push_metadata must succeed on output anchor '{}' before records are pushed",
                self.name
            )));
        }
        let Some(staged) = self.staged.as_mut() else {
            return Err(PluginError::Precondition(format!(
                "output anchor '{}' has no schema",
                self.name
            )));
        };

        let schema = staged.schema().clone();
        let records: Vec<&Record> = staged.materialize().collect();
        for record in &records {
            record.validate_against_schema(&schema)?;
        }

        let mut sent = 0;
        let mut failure = None;
        for record in &records {
            if let Err(e) = self.host.push_record(record, false) {
                failure = Some(e);
                break;
            }
            sent += 1;
        }

        self.records_pushed += sent as u64;
        tracing::debug!(anchor = %self.name, records = sent, "records pushed");
        match failure {
            Some(e) => {
                staged.discard_front(sent);
                Err(e)
            }
            None => {
                staged.clear();
                Ok(())
            }
        }
    }

    pub fn report_progress(&mut self, percent: f64) {
        self.host.update_progress(percent);
    }

    /// Signals the end of output. Only the first call reaches the host.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.host.close()
    }
}

impl fmt::Debug for OutputAnchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputAnchor")
            .field("name", &self.name)
            .field("optional", &self.optional)
            .field("metadata", &self.metadata)
            .field("staged", &self.staged.as_ref().map(RecordBuffer::len))
            .field("closed", &self.closed)
            .finish()
    }
}
