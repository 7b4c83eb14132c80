#![deny(warnings)]

//! Import/export surface: JSON backups, pasted spreadsheet blobs, and the
//! CSV report.
//!
//! Wire shapes here mirror the persisted blobs exactly, so a backup can be
//! re-imported (or pasted from a spreadsheet cell) without any translation.

use chrono::{SecondsFormat, Utc};
use hub_core::{Event, PartialCategorySet, PartialQuarterFigures, PlanningDoc, QuarterFigures, ResultRow};
use hub_metrics::{cac_usd, RowMetrics};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const BACKUP_VERSION: &str = "1.2";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("backup file is not valid JSON: {0}")]
    Backup(#[source] serde_json::Error),
    #[error("calendar blob is not valid JSON: {0}")]
    Calendar(#[source] serde_json::Error),
    #[error("calendar blob has neither events nor categories")]
    CalendarShape,
    #[error("results blob must be a JSON array of rows: {0}")]
    Results(#[source] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv encoding failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Full backup document, borrowing the live aggregates.
#[derive(Debug, Serialize)]
pub struct Backup<'a> {
    pub version: &'static str,
    #[serde(rename = "exportDate")]
    pub export_date: String,
    pub planning: &'a PlanningDoc,
    pub results: &'a [ResultRow],
    #[serde(rename = "quarterProjections")]
    pub quarter_projections: &'a QuarterFigures,
    #[serde(rename = "quarterActualNps")]
    pub quarter_actual_nps: &'a QuarterFigures,
}

pub fn make_backup<'a>(
    planning: &'a PlanningDoc,
    results: &'a [ResultRow],
    targets: &'a QuarterFigures,
    actuals: &'a QuarterFigures,
) -> Backup<'a> {
    Backup {
        version: BACKUP_VERSION,
        export_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        planning,
        results,
        quarter_projections: targets,
        quarter_actual_nps: actuals,
    }
}

/// Pretty-printed backup JSON, ready to write to a file.
pub fn backup_json(backup: &Backup<'_>) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(backup)?)
}

/// The `planning` section of a backup, or a pasted calendar cell. Both keys
/// are optional on the wire.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CalendarBlob {
    #[serde(default)]
    pub events: Option<Vec<Event>>,
    #[serde(default)]
    pub categories: Option<PartialCategorySet>,
}

/// A backup as read back: every section optional, unknown keys ignored.
#[derive(Debug, Deserialize)]
pub struct BackupImport {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub planning: Option<CalendarBlob>,
    #[serde(default)]
    pub results: Option<Vec<ResultRow>>,
    #[serde(rename = "quarterProjections", default)]
    pub quarter_projections: Option<PartialQuarterFigures>,
    #[serde(rename = "quarterActualNps", default)]
    pub quarter_actual_nps: Option<PartialQuarterFigures>,
}

pub fn parse_backup(json: &str) -> Result<BackupImport, ImportError> {
    serde_json::from_str(json).map_err(ImportError::Backup)
}

/// Restores a parsed backup into the live aggregates.
///
/// Absent sections leave their aggregate untouched. A present `planning`
/// section replaces the event list wholesale (missing `events` clears it)
/// and merges categories key by key; quarter figures merge key by key.
pub fn apply_backup(
    backup: BackupImport,
    planning: &mut PlanningDoc,
    results: &mut Vec<ResultRow>,
    targets: &mut QuarterFigures,
    actuals: &mut QuarterFigures,
) {
    if let Some(version) = &backup.version {
        info!(version, "restoring backup");
    }
    if let Some(section) = backup.planning {
        planning.events = section.events.unwrap_or_default();
        if let Some(cats) = section.categories {
            planning.categories.merge(cats);
        }
    }
    if let Some(rows) = backup.results {
        *results = rows;
    }
    if let Some(partial) = backup.quarter_projections {
        targets.merge(partial);
    }
    if let Some(partial) = backup.quarter_actual_nps {
        actuals.merge(partial);
    }
}

/// Parses a pasted calendar cell. At least one of the two keys must be
/// present for the blob to count as recognized.
pub fn parse_calendar_blob(json: &str) -> Result<CalendarBlob, ImportError> {
    let blob: CalendarBlob = serde_json::from_str(json).map_err(ImportError::Calendar)?;
    if blob.events.is_none() && blob.categories.is_none() {
        return Err(ImportError::CalendarShape);
    }
    Ok(blob)
}

/// Applies a pasted calendar cell: unlike a backup restore, a missing
/// `events` key keeps the current events.
pub fn apply_calendar_blob(blob: CalendarBlob, planning: &mut PlanningDoc) {
    if let Some(events) = blob.events {
        planning.events = events;
    }
    if let Some(cats) = blob.categories {
        planning.categories.merge(cats);
    }
}

/// Parses a pasted results cell, which must be a JSON array of rows.
pub fn parse_results_blob(json: &str) -> Result<Vec<ResultRow>, ImportError> {
    serde_json::from_str(json).map_err(ImportError::Results)
}

pub const CSV_HEADERS: [&str; 19] = [
    "Afiliado",
    "Fecha",
    "Tipo",
    "WA_Group",
    "Asistentes",
    "Trials",
    "NPs",
    "Proy_NPs",
    "Delta_NP",
    "Confirmado",
    "Con_Comision",
    "Fijo",
    "Variable",
    "Comisiones",
    "Pauta",
    "TOTAL_INV",
    "CAC_COP",
    "CAC_USD",
    "Notas",
];

fn si_no(v: bool) -> &'static str {
    if v {
        "Si"
    } else {
        "No"
    }
}

/// Renders the results table as CSV bytes: UTF-8 BOM, every field quoted,
/// booleans as Si/No, hard-currency CAC to two decimals ("0" for rows
/// without NPs).
pub fn csv_report(rows: &[ResultRow]) -> Result<Vec<u8>, ExportError> {
    let mut buf = vec![0xEF, 0xBB, 0xBF];
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(&mut buf);
    writer.write_record(CSV_HEADERS)?;
    for row in rows {
        let m = RowMetrics::of(row);
        let cac_hard = if row.nps > 0 {
            format!("{:.2}", cac_usd(m.total_investment, row.nps))
        } else {
            "0".to_string()
        };
        writer.write_record([
            row.name.clone(),
            row.date.map(|d| d.to_string()).unwrap_or_default(),
            row.kind.clone(),
            row.wa_group.to_string(),
            row.attendees.to_string(),
            row.trials.to_string(),
            row.nps.to_string(),
            row.projected_nps.to_string(),
            m.delta.to_string(),
            si_no(row.confirmed).to_string(),
            si_no(row.has_commission).to_string(),
            row.fixed.to_string(),
            row.variable.to_string(),
            m.commission.to_string(),
            row.pauta.to_string(),
            m.total_investment.to_string(),
            m.cac_local.to_string(),
            cac_hard,
            row.notes.clone(),
        ])?;
    }
    writer.flush()?;
    drop(writer);
    Ok(buf)
}
