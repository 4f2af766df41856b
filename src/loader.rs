//! Flow log loader.
//!
//! Reads the headerless CSV into an immutable [`FlowTable`]. A missing or
//! unreadable input is not an error: it yields `Ok(None)` after printing a
//! diagnostic, and the caller stops the pipeline there.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{LoadError, Result};
use crate::export::Console;
use crate::record::{FlowRecord, FIELD_COUNT};

/// Options controlling row decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadOptions {
    /// Skip undecodable rows instead of aborting the load.
    pub skip_malformed: bool,
}

/// The loaded flow records, read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct FlowTable {
    records: Vec<FlowRecord>,
    skipped_rows: usize,
    source: Option<PathBuf>,
}

impl FlowTable {
    #[cfg(test)]
    pub fn from_records(records: Vec<FlowRecord>) -> Self {
        Self {
            records,
            skipped_rows: 0,
            source: None,
        }
    }

    pub fn records(&self) -> &[FlowRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows dropped because they could not be decoded.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// The first row, whose sampling rate stands for the whole log.
    pub fn first(&self) -> Option<&FlowRecord> {
        self.records.first()
    }
}

/// Loads the flow table from `path`.
///
/// Returns `Ok(None)` when the file cannot be opened. Decoding failures
/// propagate unless `options.skip_malformed` is set.
pub fn load_flow_table(
    path: &Path,
    options: LoadOptions,
    console: &Console,
) -> Result<Option<FlowTable>> {
    console.status(&format!("load data from '{}'...", path.display()));

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            report_open_failure(path, &e, console);
            return Ok(None);
        }
    };

    let mut table = load_from_reader(BufReader::new(file), options)?;
    table.source = Some(path.to_path_buf());

    console.status("File loaded successfully!");
    info!(
        "Loaded {} flow records from {} ({} skipped)",
        table.len(),
        path.display(),
        table.skipped_rows
    );

    Ok(Some(table))
}

fn report_open_failure(path: &Path, error: &io::Error, console: &Console) {
    warn!("Failed to open {}: {}", path.display(), error);
    console.status("");
    if error.kind() == io::ErrorKind::NotFound {
        console.status(&format!("Error: '{}' was not found.", path.display()));
    } else {
        console.status(&format!(
            "Error: '{}' could not be read ({}).",
            path.display(),
            error
        ));
    }
    console.status("make sure the report binary is run from the folder containing the CSV file");
}

/// Decodes flow records from any reader.
pub fn load_from_reader<R: Read>(reader: R, options: LoadOptions) -> Result<FlowTable> {
    debug!("Decoding flow records ({} positional columns)", FIELD_COUNT);

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut skipped_rows = 0;

    for (index, result) in csv_reader.deserialize::<FlowRecord>().enumerate() {
        match result {
            Ok(record) => records.push(record),
            Err(source) => {
                let line = source
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 1);

                if !options.skip_malformed {
                    return Err(LoadError::MalformedRecord { line, source }.into());
                }

                warn!("Skipping malformed record on line {}: {}", line, source);
                skipped_rows += 1;
            }
        }
    }

    Ok(FlowTable {
        records,
        skipped_rows,
        source: None,
    })
}
