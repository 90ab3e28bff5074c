//! Streaming ASCII PLY writer
//!
//! The final vertex count is unknown while points are still being fused, so
//! the header is first written with an estimate and the `element vertex`
//! line is rewritten with the real count on [`PlyWriter::finalize`].
//!
//! Each [`PlyWriter::append`] is a single write of whole lines. If that write
//! fails, the sink is cut back to the end of the last complete batch, so the
//! body always holds exactly [`PlyWriter::written`] lines.

use crate::ColoredPoint;
use crate::ply::{PlyError, PlyLayout, rewrite_vertex_count};
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Lifecycle of a [`PlyWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Uninitialized,
    HeaderWritten { estimated: usize },
    Finalized { count: usize },
}

/// Byte stream backing a [`PlyWriter`].
///
/// The sink must write to the writer's path, since the vertex count is
/// rewritten through the file system on finalize.
pub trait PlySink: Write {
    /// Drop everything past `len` bytes and continue writing from there.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl PlySink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)?;
        self.seek(SeekFrom::Start(len))?;
        Ok(())
    }
}

/// Incremental point-cloud writer with bounded memory.
pub struct PlyWriter<S: PlySink = File> {
    path: PathBuf,
    layout: PlyLayout,
    out: Option<S>,
    state: WriterState,
    written: usize,
    /// Length of the file up to the last complete write.
    committed: u64,
}

impl PlyWriter {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: impl AsRef<Path>, layout: PlyLayout) -> Result<Self, PlyError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self::with_sink(path, layout, file))
    }
}

impl<S: PlySink> PlyWriter<S> {
    /// Writer over an already opened sink for `path`.
    pub fn with_sink(path: impl Into<PathBuf>, layout: PlyLayout, sink: S) -> Self {
        Self {
            path: path.into(),
            layout,
            out: Some(sink),
            state: WriterState::Uninitialized,
            written: 0,
            committed: 0,
        }
    }

    /// Write the header with an estimated vertex count.
    pub fn write_header(&mut self, estimated: usize) -> Result<(), PlyError> {
        if self.state != WriterState::Uninitialized {
            return Err(self.invalid("Uninitialized"));
        }
        let header = self.layout.header(estimated);
        self.commit(header.as_bytes())?;
        self.state = WriterState::HeaderWritten { estimated };
        debug!("PLY header written with estimate {}", estimated);
        Ok(())
    }

    /// Append vertex lines for `points`.
    ///
    /// Either every line lands or none does.
    pub fn append(&mut self, points: &[ColoredPoint]) -> Result<(), PlyError> {
        if !matches!(self.state, WriterState::HeaderWritten { .. }) {
            return Err(self.invalid("HeaderWritten"));
        }
        if points.is_empty() {
            return Ok(());
        }
        let mut batch = String::with_capacity(points.len() * 40);
        for p in points {
            let [x, y, z] = p.position.to_array();
            batch.push_str(&format!(
                "{} {} {} {} {} {}",
                x, y, z, p.color.r, p.color.g, p.color.b
            ));
            if self.layout.with_confidence {
                batch.push_str(&format!(" {}", p.confidence));
            }
            batch.push('\n');
        }
        self.commit(batch.as_bytes())?;
        self.written += points.len();
        Ok(())
    }

    /// Flush, close and rewrite the header with the number of points written.
    ///
    /// Finalizing an already finalized writer rewrites the same count again,
    /// which leaves the file unchanged.
    pub fn finalize(&mut self) -> Result<usize, PlyError> {
        match self.state {
            WriterState::Uninitialized => return Err(self.invalid("HeaderWritten")),
            WriterState::HeaderWritten { .. } => {
                if let Some(mut out) = self.out.take() {
                    out.flush()?;
                }
            }
            WriterState::Finalized { .. } => {}
        }
        rewrite_vertex_count(&self.path, self.written)?;
        self.state = WriterState::Finalized {
            count: self.written,
        };
        info!(
            "Finalized {} with {} vertices",
            self.path.display(),
            self.written
        );
        Ok(self.written)
    }

    /// Close the sink and delete the file.
    ///
    /// Used when no valid PLY can be produced, e.g. the header never landed.
    pub fn discard(mut self) -> Result<(), PlyError> {
        drop(self.out.take());
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Discarded {}", self.path.display());
        Ok(())
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Number of vertex lines appended so far.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn layout(&self) -> PlyLayout {
        self.layout
    }

    /// Write `bytes` in one go, or roll the sink back to the last commit.
    fn commit(&mut self, bytes: &[u8]) -> Result<(), PlyError> {
        let committed = self.committed;
        let state = self.state;
        let out = self.out.as_mut().ok_or(PlyError::InvalidState {
            expected: "open stream",
            actual: state,
        })?;
        if let Err(e) = out.write_all(bytes).and_then(|()| out.flush()) {
            if let Err(rollback) = out.truncate(committed) {
                warn!(
                    "Could not roll {} back to {} bytes: {}",
                    self.path.display(),
                    committed,
                    rollback
                );
                self.out = None;
            }
            return Err(e.into());
        }
        self.committed += bytes.len() as u64;
        Ok(())
    }

    fn invalid(&self, expected: &'static str) -> PlyError {
        PlyError::InvalidState {
            expected,
            actual: self.state,
        }
    }
}
