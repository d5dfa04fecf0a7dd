//! Flat CSV export read by the dashboard.

use crate::models::CarRecord;
use anyhow::{Context, Result};
use regex::Regex;
use std::io::Write;

struct Column {
    header: &'static str,
    /// Record keys to try, in order, compared case-insensitively
    aliases: &'static [&'static str],
    numeric: bool,
}

const COLUMNS: &[Column] = &[
    Column { header: "Listing", aliases: &["Listing"], numeric: false },
    Column { header: "Make", aliases: &["Make", "Brand", "Manufacturer"], numeric: false },
    Column { header: "Model", aliases: &["Model"], numeric: false },
    Column {
        header: "Year",
        aliases: &["Year", "Year of Manufacture", "Manufacture Year", "Model Year"],
        numeric: true,
    },
    Column { header: "Price", aliases: &["Price"], numeric: true },
    Column { header: "Mileage (km)", aliases: &["Mileage", "Mileage (km)", "Kilometers", "Odometer"], numeric: true },
    Column { header: "Drivetrain", aliases: &["Drivetrain", "Drive Train", "Drive Type", "Drive"], numeric: false },
    Column { header: "Body", aliases: &["Body", "Body Type", "Body Style"], numeric: false },
    Column { header: "Horse Power", aliases: &["Horse Power", "Horsepower", "Engine Power"], numeric: true },
    Column { header: "Transmission", aliases: &["Transmission", "Gearbox"], numeric: false },
    Column { header: "Fuel", aliases: &["Fuel", "Fuel Type"], numeric: false },
    Column { header: "Source", aliases: &["Source"], numeric: false },
    Column { header: "URL", aliases: &["URL"], numeric: false },
];

pub fn headers() -> Vec<&'static str> {
    COLUMNS.iter().map(|c| c.header).collect()
}

/// First number in a display string: "GH₵ 120,000" -> "120000", "1.8 L" -> "1.8"
pub fn normalize_number(text: &str) -> Option<String> {
    // Separators only count when a full group of three digits follows
    let number = Regex::new(r"\d{1,3}(?:[,\x{00A0} ]\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").ok()?;
    let found = number.find(text)?;
    let digits: String = found
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (!digits.is_empty()).then_some(digits)
}

fn cell(record: &CarRecord, column: &Column) -> String {
    let raw = column.aliases.iter().find_map(|alias| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(alias))
            .map(|(_, value)| value)
    });

    match raw {
        Some(value) if column.numeric => normalize_number(value).unwrap_or_default(),
        Some(value) => value.to_string(),
        None => String::new(),
    }
}

pub fn write_csv<W: Write>(records: &[CarRecord], writer: W) -> Result<usize> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(headers())?;

    for record in records {
        let row: Vec<String> = COLUMNS.iter().map(|c| cell(record, c)).collect();
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(records.len())
}

pub fn export_to_path(records: &[CarRecord], path: &str) -> Result<usize> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create export file {}", path))?;
    let written = write_csv(records, file)?;
    tracing::info!("Exported {} records to {}", written, path);
    Ok(written)
}
