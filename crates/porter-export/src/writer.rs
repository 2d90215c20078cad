//! Export file framing
//!
//! ```text
//! Vanilla Export: 1.0, Source: vBulletin
//!
//! // Export Started: 2024-05-01 10:00:00
//! Table: User
//! UserID,Name,homepage:varchar(255)
//! 1,"ann","http://ann.example"
//!
//! // Exported Table: User (1 rows, 00:00.01)
//! ```

use crate::codec::{format_comment, format_record};
use crate::error::Result;
use crate::mapping::ResolvedStructure;
use crate::value::Value;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Format version written in the banner
pub const FORMAT_VERSION: &str = "1.0";

/// Leading text of the banner line
pub const BANNER_PREFIX: &str = "Vanilla Export: ";

/// Leading text of a table marker line
pub const TABLE_PREFIX: &str = "Table: ";

/// The export file on disk, plain or gzip-compressed
pub enum OutputSink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputSink {
    pub fn create(path: &Path, compress: bool) -> Result<Self> {
        let file = BufWriter::new(File::create(path)?);
        Ok(if compress {
            OutputSink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            OutputSink::Plain(file)
        })
    }

    /// Flush everything, writing the gzip trailer when compressing
    pub fn finish(self) -> Result<()> {
        match self {
            OutputSink::Plain(mut file) => file.flush()?,
            OutputSink::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputSink::Plain(w) => w.write(buf),
            OutputSink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputSink::Plain(w) => w.flush(),
            OutputSink::Gzip(w) => w.flush(),
        }
    }
}

/// Writes banner, comments and table sections to any [`Write`]
pub struct ExportWriter<W: Write> {
    out: W,
}

impl<W: Write> ExportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// `Vanilla Export: 1.0[, Source: <label>]` followed by a blank line
    pub fn banner(&mut self, source_label: &str) -> Result<()> {
        write!(self.out, "{}{}", BANNER_PREFIX, FORMAT_VERSION)?;
        if !source_label.is_empty() {
            write!(self.out, ", Source: {}", source_label)?;
        }
        self.out.write_all(b"\n\n")?;
        Ok(())
    }

    pub fn comment(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "{}", format_comment(message))?;
        Ok(())
    }

    pub fn begin_table(&mut self, name: &str) -> Result<()> {
        writeln!(self.out, "{}{}", TABLE_PREFIX, name)?;
        Ok(())
    }

    pub fn header(&mut self, structure: &ResolvedStructure) -> Result<()> {
        writeln!(self.out, "{}", structure.header_cells().join(","))?;
        Ok(())
    }

    pub fn row(&mut self, values: &[Value]) -> Result<()> {
        writeln!(self.out, "{}", format_record(values))?;
        Ok(())
    }

    /// Blank terminator line
    pub fn end_table(&mut self) -> Result<()> {
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
