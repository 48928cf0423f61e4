use crate::core::{DataType, Field, Record, RecordHandle, Result, Schema};
use csv::{ReaderBuilder, StringRecord};
use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::rc::Rc;

/// Rows of a CSV file presented as one connection's worth of records.
///
/// Every column is a nullable string field. Rows are read eagerly but turned
/// into records only when a handle is first resolved.
pub struct CsvFeed<R: Read> {
    reader: csv::Reader<R>,
    schema: Schema,
    headers: Rc<[String]>,
}

impl CsvFeed<File> {
    pub fn open<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        Self::with_delimiter(File::open(file_path)?, b',')
    }
}

impl<R: Read> CsvFeed<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        Self::with_delimiter(reader, b',')
    }

    pub fn with_delimiter(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(reader);

        let headers: Rc<[String]> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let fields = headers
            .iter()
            .map(|name| Field::new(name.clone(), DataType::String))
            .collect();

        Ok(Self {
            reader,
            schema: Schema::new(fields),
            headers,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_handles(self) -> impl Iterator<Item = Result<RecordHandle>> {
        let headers = self.headers;
        self.reader.into_records().map(move |row| {
            let row = row?;
            let headers = Rc::clone(&headers);
            Ok(RecordHandle::pending(move || build_record(&headers, &row)))
        })
    }
}

fn build_record(headers: &[String], row: &StringRecord) -> Record {
    headers
        .iter()
        .zip(row.iter())
        .map(|(name, value)| (name.clone(), Value::String(value.trim().to_string())))
        .collect()
}
