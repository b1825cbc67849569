//! # Consensus Output
//!
//! Writes one record per draft contig, FASTA by default or FASTQ when
//! qualities were requested, to stdout or a file.

use std::io::{BufWriter, Write};
use std::path::Path;

use crate::data::ConsensusResult;
use crate::error::Result;

/// FASTA/FASTQ consensus writer.
pub struct ConsensusWriter {
    inner: Box<dyn Write + Send>,
    qualities: bool,
}

impl ConsensusWriter {
    /// Write to a file.
    pub fn create(path: &Path, qualities: bool) -> Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self {
            inner: Box::new(BufWriter::new(file)),
            qualities,
        })
    }

    /// Write to stdout.
    pub fn stdout(qualities: bool) -> Self {
        Self {
            inner: Box::new(BufWriter::new(std::io::stdout())),
            qualities,
        }
    }

    #[cfg(test)]
    fn buffer(qualities: bool) -> (Self, std::sync::Arc<std::sync::Mutex<Vec<u8>>>) {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let writer = SharedBuffer(buf.clone());
        (
            Self {
                inner: Box::new(writer),
                qualities,
            },
            buf,
        )
    }

    /// Write one consensus record. Records with an empty sequence are
    /// skipped.
    pub fn write_record(&mut self, name: &str, result: &ConsensusResult) -> Result<()> {
        if result.seq.is_empty() {
            return Ok(());
        }
        if self.qualities {
            writeln!(
                self.inner,
                "@{name}\n{}\n+\n{}",
                result.seq, result.quals
            )?;
        } else {
            writeln!(self.inner, ">{name}\n{}", result.seq)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
struct SharedBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

#[cfg(test)]
impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
