//! Summary export
//!
//! Writes the run summary as JSON to a file, or to stdout when the output
//! path is `-`.

use crate::types::TraceSummary;
use anyhow::{Context, Result};
use std::{
    fs::File,
    io::{self, Write},
    path::PathBuf,
};

/// Destination for a finished trace summary
pub trait SummaryExporter {
    fn export(&self, summary: &TraceSummary) -> Result<()>;
}

/// JSON exporter
pub struct JsonExporter {
    output_path: PathBuf,
    pretty: bool,
}

impl JsonExporter {
    /// Create a new JSON exporter
    ///
    /// # Arguments
    ///
    /// * `output_path` - Path to output file, `-` for stdout
    /// * `pretty` - Enable pretty-printing
    pub fn new(output_path: PathBuf, pretty: bool) -> Self {
        Self {
            output_path,
            pretty,
        }
    }

    fn render(&self, summary: &TraceSummary) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(summary)?
        } else {
            serde_json::to_string(summary)?
        };
        Ok(json)
    }

    fn to_stdout(&self) -> bool {
        self.output_path.as_os_str() == "-"
    }
}

impl SummaryExporter for JsonExporter {
    fn export(&self, summary: &TraceSummary) -> Result<()> {
        let json = self.render(summary)?;

        if self.to_stdout() {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", json).context("Failed to write summary to stdout")?;
            return Ok(());
        }

        let mut file = File::create(&self.output_path)
            .with_context(|| format!("Failed to create output file: {:?}", self.output_path))?;

        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write to output file: {:?}", self.output_path))?;

        Ok(())
    }
}
