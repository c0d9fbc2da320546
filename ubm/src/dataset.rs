//! Feature corpora: in-memory datasets and the plain-text feature file format.
//!
//! A feature file is a stream of whitespace-separated reals read in groups
//! of `dim`. Each group is one frame. Frames whose first coefficient is
//! exactly zero are silence markers from the front-end and are dropped.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::slice::ChunksExact;

use tracing::{debug, warn};

use crate::UbmError;

/// Frames reserved up front when loading a background training corpus.
pub const TRAINING_RESERVE: usize = 2_000_000;

/// An ordered set of fixed-length feature frames.
///
/// Frames are stored row-major in a single buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    dim: usize,
    values: Vec<f64>,
}

impl Dataset {
    /// Creates an empty dataset. Panics if `dim` is 0.
    pub fn new(dim: usize) -> Self {
        Self::with_capacity(dim, 0)
    }

    /// Creates an empty dataset with room for `frames` frames.
    pub fn with_capacity(dim: usize, frames: usize) -> Self {
        assert!(dim > 0, "ubm: Dataset dim must be positive");
        Self {
            dim,
            values: Vec::with_capacity(frames.saturating_mul(dim)),
        }
    }

    /// Builds a dataset from frame slices, checking each frame's length.
    pub fn from_frames<I, F>(dim: usize, frames: I) -> Result<Self, UbmError>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[f64]>,
    {
        check_dim(dim)?;
        let mut ds = Self::new(dim);
        for f in frames {
            ds.push(f.as_ref())?;
        }
        Ok(ds)
    }

    /// Appends one frame.
    pub fn push(&mut self, frame: &[f64]) -> Result<(), UbmError> {
        if frame.len() != self.dim {
            return Err(UbmError::DimensionMismatch {
                expected: self.dim,
                got: frame.len(),
            });
        }
        if let Some(v) = frame.iter().find(|v| !v.is_finite()) {
            return Err(UbmError::InvalidFormat(format!("non-finite value {v}")));
        }
        self.values.extend_from_slice(frame);
        Ok(())
    }

    /// Returns the frame dimension.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Returns the number of frames.
    pub fn len(&self) -> usize {
        self.values.len() / self.dim
    }

    /// Returns true if there are no frames.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns frame `i`. Panics if out of range.
    pub fn frame(&self, i: usize) -> &[f64] {
        &self.values[i * self.dim..(i + 1) * self.dim]
    }

    /// Iterates over frames in order.
    pub fn frames(&self) -> ChunksExact<'_, f64> {
        self.values.chunks_exact(self.dim)
    }

    /// Counts distinct frame locations, stopping early once `limit` is reached.
    pub(crate) fn distinct_frames(&self, limit: usize) -> usize {
        let mut seen: HashSet<Vec<u64>> = HashSet::new();
        for f in self.frames() {
            // Normalise -0.0 so it compares equal to 0.0.
            let key: Vec<u64> = f.iter().map(|&v| (v + 0.0).to_bits()).collect();
            seen.insert(key);
            if seen.len() >= limit {
                break;
            }
        }
        seen.len()
    }

    /// Parses a feature stream, dropping frames whose first value is 0.
    pub fn from_reader<R: BufRead>(reader: R, dim: usize) -> Result<Self, UbmError> {
        Self::from_reader_with_capacity(reader, dim, 0)
    }

    /// Like [`Dataset::from_reader`] with `frames` frames reserved up front.
    pub fn from_reader_with_capacity<R: BufRead>(
        mut reader: R,
        dim: usize,
        frames: usize,
    ) -> Result<Self, UbmError> {
        check_dim(dim)?;
        let mut ds = Self::with_capacity(dim, frames);
        let mut group: Vec<f64> = Vec::with_capacity(dim);
        let mut line = String::new();
        let mut line_no = 0usize;
        let mut dropped = 0usize;

        loop {
            line.clear();
            let n = reader
                .read_line(&mut line)
                .map_err(|e| UbmError::Io(e.to_string()))?;
            if n == 0 {
                break;
            }
            line_no += 1;
            for tok in line.split_whitespace() {
                let v: f64 = tok.parse().map_err(|_| {
                    UbmError::InvalidFormat(format!("line {line_no}: not a number: {tok:?}"))
                })?;
                if !v.is_finite() {
                    return Err(UbmError::InvalidFormat(format!(
                        "line {line_no}: non-finite value: {tok:?}"
                    )));
                }
                group.push(v);
                if group.len() == dim {
                    if group[0] != 0.0 {
                        ds.values.extend_from_slice(&group);
                    } else {
                        dropped += 1;
                    }
                    group.clear();
                }
            }
        }

        if !group.is_empty() {
            warn!(
                "ubm: discarding trailing partial frame ({} of {} values)",
                group.len(),
                dim
            );
        }
        debug!("ubm: read {} frames, dropped {} silence frames", ds.len(), dropped);
        Ok(ds)
    }

    /// Loads a feature file.
    pub fn load(path: impl AsRef<Path>, dim: usize) -> Result<Self, UbmError> {
        FeatureFile::new(path.as_ref()).load(dim)
    }

    /// Loads a background training corpus, reserving [`TRAINING_RESERVE`] frames.
    pub fn load_training(path: impl AsRef<Path>, dim: usize) -> Result<Self, UbmError> {
        FeatureFile::training(path.as_ref()).load(dim)
    }
}

fn check_dim(dim: usize) -> Result<(), UbmError> {
    if dim == 0 {
        return Err(UbmError::InvalidConfig("dim must be positive".into()));
    }
    Ok(())
}

/// Supplies a dataset of a requested dimension.
pub trait CorpusSource {
    /// Produces the corpus with frames of length `dim`.
    fn load(&self, dim: usize) -> Result<Dataset, UbmError>;
}

/// A feature file on disk.
#[derive(Debug, Clone)]
pub struct FeatureFile {
    path: PathBuf,
    reserve: usize,
}

impl FeatureFile {
    /// A feature file with no preallocation, for personal or test corpora.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reserve: 0,
        }
    }

    /// A background training corpus.
    pub fn training(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reserve: TRAINING_RESERVE,
        }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CorpusSource for FeatureFile {
    fn load(&self, dim: usize) -> Result<Dataset, UbmError> {
        let file = File::open(&self.path).map_err(|e| UbmError::from_io(&self.path, e))?;
        let ds = Dataset::from_reader_with_capacity(BufReader::new(file), dim, self.reserve)
            .map_err(|e| match e {
                UbmError::InvalidFormat(msg) => {
                    UbmError::InvalidFormat(format!("{}: {msg}", self.path.display()))
                }
                other => other,
            })?;
        debug!("ubm: loaded {} frames from {}", ds.len(), self.path.display());
        Ok(ds)
    }
}

impl CorpusSource for Dataset {
    fn load(&self, dim: usize) -> Result<Dataset, UbmError> {
        if self.dim != dim {
            return Err(UbmError::DimensionMismatch {
                expected: dim,
                got: self.dim,
            });
        }
        Ok(self.clone())
    }
}

/// Loads every regular file in `dir` as one cohort recording.
///
/// Sub-directories are skipped. Order follows the filesystem.
pub fn load_cohort(dir: impl AsRef<Path>, dim: usize) -> Result<Vec<Dataset>, UbmError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| UbmError::from_io(dir, e))?;
    let mut cohort = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| UbmError::from_io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        cohort.push(FeatureFile::new(path).load(dim)?);
    }
    debug!("ubm: loaded {} cohort recordings from {}", cohort.len(), dir.display());
    Ok(cohort)
}
