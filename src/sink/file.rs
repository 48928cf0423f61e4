use crate::core::{OutputAnchorHost, PluginError, Record, Result, Schema};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Output anchor that writes each pushed record as one JSON object per line,
/// with keys in schema order.
pub struct JsonLinesAnchor<W: Write> {
    writer: BufWriter<W>,
    schema: Option<Schema>,
    lines: u64,
}

impl JsonLinesAnchor<File> {
    pub fn create<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(file_path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesAnchor<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            schema: None,
            lines: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| PluginError::Io(e.into_error()))
    }
}

struct Ordered<'a> {
    schema: &'a Schema,
    record: &'a Record,
}

impl Serialize for Ordered<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schema.len()))?;
        for field in &self.schema.fields {
            let value = self.record.get_field(&field.name).unwrap_or(&Value::Null);
            map.serialize_entry(&field.name, value)?;
        }
        map.end()
    }
}

impl<W: Write> OutputAnchorHost for JsonLinesAnchor<W> {
    fn init(&mut self, schema: &Schema) -> Result<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn push_record(&mut self, record: &Record, _is_final: bool) -> Result<()> {
        let schema = self.schema.as_ref().ok_or_else(|| {
            PluginError::Precondition("record pushed before the anchor was initialized".to_string())
        })?;

        serde_json::to_writer(&mut self.writer, &Ordered { schema, record })?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    fn update_progress(&mut self, percent: f64) {
        tracing::trace!(percent, "json lines anchor progress");
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
