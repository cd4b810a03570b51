//! CSV output of the sample buffer.
//!
//! Every save rewrites the whole file. The rows go to `<destination>.tmp`
//! first, which is synced and then renamed over the destination, so a
//! failed save leaves the previous file in place rather than a truncated one.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::buffer::SampleRow;
use crate::channel::Channel;
use crate::error::PersistenceError;

/// Format of the optional leading timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

const TEMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct CsvWriter {
    destination: PathBuf,
    timestamp_column: bool,
}

impl CsvWriter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            timestamp_column: false,
        }
    }

    /// Prefix every line with the row's capture time.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamp_column = enabled;
        self
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub async fn save(&self, rows: &[SampleRow]) -> Result<(), PersistenceError> {
        let contents = render(rows, self.timestamp_column);
        let temp = temp_path(&self.destination)?;

        if let Err(source) = write_and_replace(&temp, &self.destination, contents.as_bytes()).await {
            if fs::remove_file(&temp).await.is_ok() {
                debug!("removed partial file {}", temp.display());
            }
            return Err(PersistenceError::Io {
                path: self.destination.clone(),
                source,
            });
        }
        Ok(())
    }
}

/// Write `rows` to `destination` with the default four-column layout.
pub async fn save(rows: &[SampleRow], destination: &Path) -> Result<(), PersistenceError> {
    CsvWriter::new(destination).save(rows).await
}

/// Render the header and one line per row, in row order.
pub fn render(rows: &[SampleRow], timestamp_column: bool) -> String {
    let mut out = String::with_capacity(32 + rows.len() * 32);

    if timestamp_column {
        out.push_str("Timestamp,");
    }
    let header: Vec<&str> = Channel::ALL.iter().map(|c| c.label()).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for row in rows {
        if timestamp_column {
            out.push_str(&format!("{},", row.captured_at.format(TIMESTAMP_FORMAT)));
        }
        let [a, b, c, d] = row.values;
        out.push_str(&format!("{a},{b},{c},{d}\n"));
    }
    out
}

fn temp_path(destination: &Path) -> Result<PathBuf, PersistenceError> {
    let Some(file_name) = destination.file_name() else {
        return Err(PersistenceError::InvalidPath(destination.to_path_buf()));
    };
    let mut temp_name = file_name.to_os_string();
    temp_name.push(TEMP_SUFFIX);
    Ok(destination.with_file_name(temp_name))
}

async fn write_and_replace(temp: &Path, destination: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(temp).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temp, destination).await
}
