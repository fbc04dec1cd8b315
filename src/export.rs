//! Tabular export of aggregate results.
//!
//! Series and histograms are written through polars, as Parquet or CSV
//! depending on the output extension. Time columns are stored as
//! millisecond-precision UTC datetimes.

use crate::aggregate::AggregateHistogram;
use crate::constants::columns;
use crate::error::{CollectorError, Result};
use crate::models::Timestamp;
use polars::prelude::{
    Column, CsvWriter, DataFrame, DataType, ParquetCompression, ParquetWriter, SerWriter,
    TimeUnit,
};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Output file type, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Parquet,
    Csv,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("parquet") => Ok(Self::Parquet),
            Some("csv") => Ok(Self::Csv),
            _ => Err(CollectorError::configuration(format!(
                "Cannot export to '{}': use a .parquet or .csv file",
                path.display()
            ))),
        }
    }
}

fn export_error(path: &Path, reason: impl ToString) -> CollectorError {
    CollectorError::Export {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn datetime_column(path: &Path, name: &str, times: &[Timestamp]) -> Result<Column> {
    let millis: Vec<i64> = times.iter().map(|t| t.timestamp_millis()).collect();
    Column::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
        .map_err(|e| export_error(path, e))
}

fn write_frame(path: &Path, mut df: DataFrame) -> Result<usize> {
    let format = ExportFormat::from_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;

    match format {
        ExportFormat::Parquet => {
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .finish(&mut df)
                .map_err(|e| export_error(path, e))?;
        }
        ExportFormat::Csv => {
            CsvWriter::new(file)
                .include_header(true)
                .finish(&mut df)
                .map_err(|e| export_error(path, e))?;
        }
    }

    debug!(
        "Exported {} rows x {} columns to {}",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df.height())
}

/// Write a time column plus one integer column per named series
///
/// Every column must have one value per timestamp. Returns the row count.
pub fn export_series(
    path: &Path,
    times: &[Timestamp],
    series: &[(&str, &[i64])],
) -> Result<usize> {
    let mut frame_columns = Vec::with_capacity(series.len() + 1);
    frame_columns.push(datetime_column(path, columns::TIME, times)?);

    for (name, values) in series {
        if values.len() != times.len() {
            return Err(export_error(
                path,
                format!(
                    "column '{}' has {} values for {} timestamps",
                    name,
                    values.len(),
                    times.len()
                ),
            ));
        }
        frame_columns.push(Column::new((*name).into(), values.to_vec()));
    }

    let df = DataFrame::new(frame_columns).map_err(|e| export_error(path, e))?;
    write_frame(path, df)
}

/// Write one row per bin: start, end and value
pub fn export_histogram(path: &Path, edges: &[Timestamp], values: &[i64]) -> Result<usize> {
    if edges.len() != values.len() + 1 {
        return Err(export_error(
            path,
            format!("{} edges cannot bound {} bins", edges.len(), values.len()),
        ));
    }

    let df = DataFrame::new(vec![
        datetime_column(path, columns::BIN_START, &edges[..values.len()])?,
        datetime_column(path, columns::BIN_END, &edges[1..])?,
        Column::new(columns::ACTIVITY.into(), values.to_vec()),
    ])
    .map_err(|e| export_error(path, e))?;
    write_frame(path, df)
}

pub fn export_aggregate_histogram(path: &Path, aggregate: &AggregateHistogram) -> Result<usize> {
    export_histogram(path, &aggregate.edges, &aggregate.values)
}
