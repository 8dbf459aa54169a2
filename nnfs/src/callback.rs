//! Epoch summaries and the observers that receive them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::error::{NnfsError, Result};
use crate::Callback;

/// Named scalar results of one epoch (or one `evaluate` call).
///
/// Always contains `"loss"`. Keys iterate in sorted order.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    values: BTreeMap<String, f64>,
}

impl Summary {
    pub const LOSS: &'static str = "loss";
    pub const REGULARIZATION_LOSS: &'static str = "regularization_loss";
    /// Prepended to the names of values measured on the validation set.
    pub const VALIDATION_PREFIX: &'static str = "val_";

    pub fn new(loss: f64) -> Self {
        let mut values = BTreeMap::new();
        values.insert(Self::LOSS.to_string(), loss);
        Summary { values }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn loss(&self) -> f64 {
        self.values[Self::LOSS]
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.values.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value:.4}")?;
        }
        Ok(())
    }
}

/// Writes one CSV row per epoch: the epoch index followed by every value in
/// the summary.
///
/// The columns are fixed by the first summary logged; a later summary without
/// one of them gets an empty cell.
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
    columns: Option<Vec<String>>,
}

impl CsvLogger {
    /// Create the log file. Fails if it already exists, unless `overwrite`.
    pub fn new(path: impl AsRef<Path>, overwrite: bool) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() && !overwrite {
            return Err(NnfsError::config(format!(
                "{} already exists; pass overwrite to replace it",
                path.display()
            )));
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(CsvLogger {
            path: path.to_owned(),
            writer: csv::Writer::from_writer(file),
            columns: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for CsvLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvLogger")
            .field("path", &self.path)
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

impl Callback for CsvLogger {
    fn on_epoch_end(&mut self, epoch: usize, summary: &Summary) -> Result<bool> {
        if self.columns.is_none() {
            let names: Vec<String> = summary.iter().map(|(k, _)| k.to_string()).collect();
            let mut header = vec!["epoch"];
            header.extend(names.iter().map(String::as_str));
            self.writer.write_record(&header)?;
            self.columns = Some(names);
        }
        let columns = self.columns.as_deref().unwrap_or_default();

        let mut record = vec![epoch.to_string()];
        record.extend(
            columns
                .iter()
                .map(|name| summary.get(name).map(|v| v.to_string()).unwrap_or_default()),
        );
        self.writer.write_record(&record)?;
        self.writer.flush()?;
        Ok(true)
    }
}
