// src/accumulate.rs

use chrono::NaiveDate;
use csv::WriterBuilder;
use std::{fs, path::Path};
use tracing::{info, warn};

use crate::{
    dates::format_date,
    error::{HarvestError, Result},
    extract::TableSnapshot,
};

/// A successfully extracted date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestRecord {
    pub date: NaiveDate,
    pub snapshot: TableSnapshot,
}

/// The flattened, date-tagged output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Collects records in the order dates were harvested.
#[derive(Debug, Default)]
pub struct Accumulator {
    records: Vec<HarvestRecord>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, date: NaiveDate, snapshot: TableSnapshot) {
        self.records.push(HarvestRecord { date, snapshot });
    }

    pub fn records(&self) -> &[HarvestRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total data rows across all records.
    pub fn row_count(&self) -> usize {
        self.records.iter().map(|r| r.snapshot.rows.len()).sum()
    }

    /// `Date` + the first record's headers, then one row per data row.
    ///
    /// Later records with a different header layout are still emitted
    /// positionally under the first header.
    pub fn combine(&self) -> Result<CombinedTable> {
        let first = self.records.first().ok_or(HarvestError::EmptyResult)?;

        let mut header = Vec::with_capacity(first.snapshot.headers.len() + 1);
        header.push("Date".to_string());
        header.extend(first.snapshot.headers.iter().cloned());

        let mut rows = Vec::with_capacity(self.row_count());
        for record in &self.records {
            let date = format_date(record.date);
            for row in &record.snapshot.rows {
                let mut out = Vec::with_capacity(row.len() + 1);
                out.push(date.clone());
                out.extend(row.iter().cloned());
                rows.push(out);
            }
        }

        Ok(CombinedTable { header, rows })
    }
}

impl CombinedTable {
    /// Write as UTF-8 CSV: into `<path>.tmp`, then renamed over `path`.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = Path::new(&tmp_name);

        if let Err(e) = self
            .write_records(tmp)
            .and_then(|()| fs::rename(tmp, path).map_err(HarvestError::from))
        {
            if tmp.exists() {
                if let Err(rm) = fs::remove_file(tmp) {
                    warn!(path = %tmp.display(), error = %rm, "could not remove temp file");
                }
            }
            return Err(e);
        }

        info!(
            path = %path.display(),
            rows = self.rows.len(),
            columns = self.header.len(),
            "wrote combined table"
        );
        Ok(())
    }

    fn write_records(&self, tmp: &Path) -> Result<()> {
        let mut writer = WriterBuilder::new().flexible(true).from_path(tmp)?;
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
