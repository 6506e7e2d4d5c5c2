// src/config.rs
//
// Run configuration, written next to every driver output as config.json.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::depth_frames::FramePairOptions;
use crate::error::Result;
use crate::params::{DataTermParams, OrthographicFieldOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub fields: OrthographicFieldOptions,
    /// Recorded frame pair used instead of the synthetic fields, if any.
    #[serde(default)]
    pub frames: Option<FramePairOptions>,
    pub data_term: DataTermParams,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub nx: usize,
    pub ny: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericsConfig {
    /// Rows of the whole-grid data term evaluated with Rayon.
    pub parallel: bool,
    /// Data gradient convolved with the Sobolev kernel after evaluation.
    pub sobolev_smoothing: bool,
    /// Zero components stay zero during Sobolev smoothing.
    pub preserve_zeros: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,

    // Optional provenance (can be filled later)
    pub git_commit: Option<String>,
    pub timestamp_unix_s: Option<u64>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        let path = out_dir.join("config.json");
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}
