use crate::domain::ports::ProfitLedger;
use crate::domain::profit::{NewProfitReport, ProfitReport};
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

/// An append-only profit ledger stored as a CSV file.
///
/// The header row is written with the first report. Ids are assigned as one
/// past the highest id already in the file, so the ledger survives restarts.
/// Rows that fail to parse, such as a line torn by a crash mid-write, are
/// skipped with a warning.
pub struct CsvProfitLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvProfitLedger {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<Vec<ProfitReport>, LedgerError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(file);
        let mut reports = Vec::new();
        for row in reader.deserialize::<ProfitReport>() {
            match row {
                Ok(report) => reports.push(report),
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(csv::Position::line);
                    warn!(path = %self.path.display(), ?line, error = %e, "skipping malformed ledger row");
                }
            }
        }
        Ok(reports)
    }

    fn append(&self, report: &ProfitReport) -> Result<(), LedgerError> {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        // Keep a torn last line from swallowing the new row.
        if len > 0 && !ends_with_newline(&self.path)? {
            file.write_all(b"\n")?;
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(len == 0)
            .from_writer(file);
        writer.serialize(report)?;
        writer.flush()?;
        Ok(())
    }
}

fn ends_with_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = File::open(path)?;
    if file.seek(SeekFrom::End(-1)).is_err() {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

#[async_trait]
impl ProfitLedger for CsvProfitLedger {
    async fn record(&self, report: NewProfitReport) -> Result<ProfitReport, LedgerError> {
        let _guard = self.write_lock.lock().await;
        let next_id = self
            .read_all()?
            .iter()
            .map(|r| r.id)
            .max()
            .unwrap_or_default()
            + 1;
        let report = report.into_report(next_id, Utc::now());
        self.append(&report)?;
        Ok(report)
    }

    async fn all(&self) -> Result<Vec<ProfitReport>, LedgerError> {
        let _guard = self.write_lock.lock().await;
        self.read_all()
    }
}
