//! WAL events
//!
//! The typed events a decoded write-ahead-log page carries.

/// One mutation recorded in the write-ahead log
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Insert or overwrite a key
    Add { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Event {
    pub fn add(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Event::Add {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Event::Delete { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Event::Add { key, .. } | Event::Delete { key } => key,
        }
    }
}
