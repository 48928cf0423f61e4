use crate::core::{Record, RecordHandle, Schema};

/// Insertion-ordered run of record handles bound to one schema.
#[derive(Debug)]
pub struct RecordBuffer {
    schema: Schema,
    handles: Vec<RecordHandle>,
}

impl RecordBuffer {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            handles: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn append(&mut self, handle: impl Into<RecordHandle>) {
        self.handles.push(handle.into());
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drops every handle; the schema binding stays.
    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RecordHandle> {
        self.handles.iter()
    }

    /// Resolves pending handles left to right and yields every record in order.
    pub fn materialize(&mut self) -> impl Iterator<Item = &Record> {
        for handle in &mut self.handles {
            handle.resolve();
        }
        self.handles.iter().filter_map(RecordHandle::resolved)
    }

    /// Removes the first `count` handles, keeping the rest in order.
    pub(crate) fn discard_front(&mut self, count: usize) {
        let count = count.min(self.handles.len());
        self.handles.drain(..count);
    }
}

impl Extend<Record> for RecordBuffer {
    fn extend<I: IntoIterator<Item = Record>>(&mut self, iter: I) {
        self.handles.extend(iter.into_iter().map(RecordHandle::from));
    }
}

impl<'a> IntoIterator for &'a RecordBuffer {
    type Item = &'a RecordHandle;
    type IntoIter = std::slice::Iter<'a, RecordHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
