use crate::core::{PluginError, Record, RecordBuffer, RecordHandle, Result, Schema};
use std::fmt;

/// Position of a connection: input anchor index, then connection index on that anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub anchor: usize,
    pub index: usize,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.anchor, self.index)
    }
}

/// Lifecycle of one connection. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionState {
    Pending,
    Initialized,
    Closed,
}

/// One inbound link into an input anchor.
///
/// Pure state holder: transitions are validated here, but nothing in this
/// type decides what happens next in the plugin lifecycle.
#[derive(Debug)]
pub struct Connection {
    name: String,
    state: ConnectionState,
    progress: f64,
    schema: Option<Schema>,
    buffers: Vec<RecordBuffer>,
}

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: ConnectionState::Pending,
            progress: 0.0,
            schema: None,
            buffers: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state >= ConnectionState::Initialized
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn buffers(&self) -> &[RecordBuffer] {
        &self.buffers
    }

    pub fn buffer_mut(&mut self, index: usize) -> Result<&mut RecordBuffer> {
        self.buffers
            .get_mut(index)
            .ok_or_else(|| PluginError::not_found("record buffer", index.to_string()))
    }

    /// Buffer bound to the negotiated schema.
    pub fn primary_buffer_mut(&mut self) -> Result<&mut RecordBuffer> {
        self.buffer_mut(0)
    }

    /// Records pending in the primary buffer.
    pub fn pending_records(&self) -> usize {
        self.buffers.first().map_or(0, RecordBuffer::len)
    }

    /// Adds a buffer that receives a projection of every incoming record.
    /// Returns its index.
    pub fn add_buffer(&mut self, schema: Schema) -> Result<usize> {
        if !self.is_initialized() {
            return Err(PluginError::InvalidState(format!(
                "connection '{}' has no schema yet",
                self.name
            )));
        }
        self.buffers.push(RecordBuffer::new(schema));
        Ok(self.buffers.len() - 1)
    }

    pub fn mark_initialized(&mut self, schema: Schema) -> Result<()> {
        if self.state != ConnectionState::Pending {
            return Err(PluginError::InvalidState(format!(
                "connection '{}' initialized twice",
                self.name
            )));
        }
        self.buffers = vec![RecordBuffer::new(schema.clone())];
        self.schema = Some(schema);
        self.state = ConnectionState::Initialized;
        Ok(())
    }

    pub fn mark_closed(&mut self) -> Result<()> {
        match self.state {
            ConnectionState::Initialized => {
                self.state = ConnectionState::Closed;
                Ok(())
            }
            ConnectionState::Pending => Err(PluginError::InvalidState(format!(
                "connection '{}' closed before it was initialized",
                self.name
            ))),
            ConnectionState::Closed => Err(PluginError::InvalidState(format!(
                "connection '{}' closed twice",
                self.name
            ))),
        }
    }

    pub fn progress_update(&mut self, percent: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&percent) || percent < self.progress {
            return Err(PluginError::OutOfRange {
                value: percent,
                last: self.progress,
            });
        }
        self.progress = percent;
        Ok(())
    }

    /// Appends a handle to one buffer and returns that buffer's new length.
    pub fn record_received(&mut self, schema_index: usize, handle: RecordHandle) -> Result<usize> {
        self.ensure_open()?;
        let buffer = self.buffer_mut(schema_index)?;
        buffer.append(handle);
        Ok(buffer.len())
    }

    /// Delivers one incoming record to every buffer.
    ///
    /// With a single buffer the handle is stored untouched. Otherwise the
    /// record is resolved once and projection buffers get lazy copies.
    /// Returns the primary buffer's new length.
    pub fn ingest(&mut self, handle: RecordHandle) -> Result<usize> {
        self.ensure_open()?;
        if self.buffers.len() <= 1 {
            return self.record_received(0, handle);
        }

        let record = handle.into_record();
        for buffer in self.buffers.iter_mut().skip(1) {
            let source = record.clone();
            let schema = buffer.schema().clone();
            buffer.append(RecordHandle::pending(move || source.project(&schema)));
        }
        self.record_received(0, RecordHandle::Resolved(record))
    }

    pub fn clear_records(&mut self) {
        self.buffers.iter_mut().for_each(RecordBuffer::clear);
    }

    /// Records of the primary buffer, resolved and cloned in arrival order.
    pub fn collect_records(&mut self) -> Result<Vec<Record>> {
        let records = self.primary_buffer_mut()?.materialize().cloned().collect();
        Ok(records)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            ConnectionState::Initialized => Ok(()),
            ConnectionState::Pending => Err(PluginError::InvalidState(format!(
                "record received on uninitialized connection '{}'",
                self.name
            ))),
            ConnectionState::Closed => Err(PluginError::InvalidState(format!(
                "record received on closed connection '{}'",
                self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Field};
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("a", DataType::Integer),
            Field::new("b", DataType::String),
        ])
    }

    fn row(a: i64, b: &str) -> Record {
        [("a".to_string(), json!(a)), ("b".to_string(), json!(b))]
            .into_iter()
            .collect()
    }

    fn open() -> Connection {
        let mut conn = Connection::new("#1");
        conn.mark_initialized(schema()).unwrap();
        conn
    }

    #[test]
    fn test_close_requires_initialization() {
        let mut conn = Connection::new("#1");
        assert!(matches!(conn.mark_closed(), Err(PluginError::InvalidState(_))));
        conn.mark_initialized(schema()).unwrap();
        conn.mark_closed().unwrap();
        assert!(conn.is_initialized());
        assert!(conn.is_closed());
    }

    #[test]
    fn test_progress_rejects_regression_and_bounds() {
        let mut conn = open();
        conn.progress_update(10.0).unwrap();
        conn.progress_update(10.0).unwrap();
        assert!(matches!(
            conn.progress_update(5.0),
            Err(PluginError::OutOfRange { .. })
        ));
        assert!(conn.progress_update(100.5).is_err());
        assert!(conn.progress_update(f64::NAN).is_err());
        assert_eq!(conn.progress(), 10.0);
    }

    #[test]
    fn test_record_received_requires_open_connection() {
        let mut pending = Connection::new("#2");
        assert!(pending.record_received(0, row(1, "x").into()).is_err());

        let mut conn = open();
        assert_eq!(conn.record_received(0, row(1, "x").into()).unwrap(), 1);
        assert!(matches!(
            conn.record_received(4, row(2, "y").into()),
            Err(PluginError::NotFound { .. })
        ));
        conn.mark_closed().unwrap();
        assert!(conn.record_received(0, row(3, "z").into()).is_err());
    }

    #[test]
    fn test_ingest_fans_out_projection() {
        let mut conn = open();
        let only_b = schema().select(&["b"]);
        let idx = conn.add_buffer(only_b).unwrap();

        assert_eq!(conn.ingest(row(1, "x").into()).unwrap(), 1);
        assert_eq!(conn.ingest(row(2, "y").into()).unwrap(), 2);

        let projected: Vec<Record> = conn.buffer_mut(idx).unwrap().materialize().cloned().collect();
        assert_eq!(projected.len(), 2);
        assert_eq!(projected[1].get_field("b"), Some(&json!("y")));
        assert!(projected[1].get_field("a").is_none());

        conn.clear_records();
        assert_eq!(conn.pending_records(), 0);
        assert!(conn.buffers().iter().all(RecordBuffer::is_empty));
    }

    #[test]
    fn test_collect_records_keeps_buffer() {
        let mut conn = open();
        conn.ingest(RecordHandle::pending(|| row(5, "p"))).unwrap();
        let records = conn.collect_records().unwrap();
        assert_eq!(records, vec![row(5, "p")]);
        assert_eq!(conn.pending_records(), 1);
    }
}
