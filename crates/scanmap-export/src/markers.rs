//! Marker-list artifact (`<base>.json`).

use std::fs;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use scanmap_core::MarkerRecord;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum MarkerListError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Top-level JSON object: `{"markers": [...]}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerList {
    pub markers: Vec<MarkerRecord>,
}

impl MarkerList {
    pub fn new(markers: Vec<MarkerRecord>) -> Self {
        Self { markers }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn from_reader<R: Read>(r: R) -> Result<Self, MarkerListError> {
        Ok(serde_json::from_reader(r)?)
    }

    /// Encode as pretty JSON and flush.
    pub fn to_writer<W: Write>(&self, w: W) -> Result<(), MarkerListError> {
        let mut w = BufWriter::new(w);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }

    /// Load a marker list from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, MarkerListError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this marker list to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), MarkerListError> {
        self.to_writer(fs::File::create(path)?)
    }
}
