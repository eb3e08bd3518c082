//! Wide CSV data adapter.
//!
//! Layout: a header `date,<asset>,<asset>...` and one row per period.
//! Empty, `NA`, `NaN` and `null` cells are missing observations. Price files
//! are converted to simple returns; a return is missing whenever either of
//! its two prices is.

use crate::domain::error::RpsimError;
use crate::domain::panel::ReturnPanel;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeriesKind {
    #[default]
    Returns,
    Prices,
}

impl FromStr for SeriesKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "returns" => Ok(SeriesKind::Returns),
            "prices" => Ok(SeriesKind::Prices),
            other => Err(format!("unknown series kind '{other}'")),
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeriesKind::Returns => write!(f, "returns"),
            SeriesKind::Prices => write!(f, "prices"),
        }
    }
}

pub struct CsvAdapter {
    path: PathBuf,
    kind: SeriesKind,
}

struct RawTable {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    /// `rows[t][asset]`
    rows: Vec<Vec<Option<f64>>>,
}

impl CsvAdapter {
    pub fn new(path: PathBuf, kind: SeriesKind) -> Self {
        Self { path, kind }
    }

    fn read_table(&self) -> Result<RawTable, RpsimError> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            RpsimError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to read {}: {}", self.path.display(), e),
            ))
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr.headers()?.clone();
        if headers.len() < 2 {
            return Err(RpsimError::DataFormat {
                reason: "expected a date column followed by at least one asset column".into(),
            });
        }
        let assets: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

        let mut parsed: Vec<(NaiveDate, Vec<Option<f64>>)> = Vec::new();
        for result in rdr.records() {
            let record = result?;
            let date_str = record.get(0).ok_or_else(|| RpsimError::DataFormat {
                reason: "missing date column".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(|e| {
                RpsimError::DataFormat {
                    reason: format!("invalid date '{date_str}': {e}"),
                }
            })?;
            if record.len() != headers.len() {
                return Err(RpsimError::DataFormat {
                    reason: format!("row {date} has {} fields, expected {}", record.len(), headers.len()),
                });
            }
            let values = record
                .iter()
                .skip(1)
                .zip(&assets)
                .map(|(cell, asset)| parse_cell(cell, asset, date))
                .collect::<Result<Vec<_>, _>>()?;
            parsed.push((date, values));
        }

        parsed.sort_by_key(|(date, _)| *date);
        if let Some(pair) = parsed.windows(2).find(|p| p[0].0 == p[1].0) {
            return Err(RpsimError::DataFormat {
                reason: format!("duplicate date {}", pair[0].0),
            });
        }

        let (dates, rows) = parsed.into_iter().unzip();
        Ok(RawTable {
            assets,
            dates,
            rows,
        })
    }
}

fn parse_cell(cell: &str, asset: &str, date: NaiveDate) -> Result<Option<f64>, RpsimError> {
    let cell = cell.trim();
    if cell.is_empty() || ["na", "nan", "null"].contains(&cell.to_lowercase().as_str()) {
        return Ok(None);
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(RpsimError::DataFormat {
            reason: format!("invalid value '{cell}' for {asset} on {date}"),
        }),
    }
}

/// Simple returns from prices. The first period has no return and is dropped.
fn prices_to_returns(table: RawTable) -> Result<RawTable, RpsimError> {
    for (date, row) in table.dates.iter().zip(&table.rows) {
        if let Some((asset, price)) = table
            .assets
            .iter()
            .zip(row)
            .find_map(|(a, p)| p.filter(|p| *p <= 0.0).map(|p| (a, p)))
        {
            return Err(RpsimError::DataFormat {
                reason: format!("non-positive price {price} for {asset} on {date}"),
            });
        }
    }

    let rows = table
        .rows
        .windows(2)
        .map(|pair| {
            pair[0]
                .iter()
                .zip(&pair[1])
                .map(|(prev, curr)| match (prev, curr) {
                    (Some(p0), Some(p1)) => Some(p1 / p0 - 1.0),
                    _ => None,
                })
                .collect()
        })
        .collect();
    Ok(RawTable {
        assets: table.assets,
        dates: table.dates.into_iter().skip(1).collect(),
        rows,
    })
}

impl DataPort for CsvAdapter {
    fn load_panel(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<ReturnPanel, RpsimError> {
        let mut table = self.read_table()?;
        if self.kind == SeriesKind::Prices {
            table = prices_to_returns(table)?;
        }
        let columns = (0..table.assets.len())
            .map(|a| table.rows.iter().map(|row| row[a]).collect())
            .collect();
        let panel = ReturnPanel::new(table.assets, table.dates, columns)?;
        Ok(panel.between(start_date, end_date))
    }

    fn list_assets(&self) -> Result<Vec<String>, RpsimError> {
        Ok(self.read_table()?.assets)
    }
}
