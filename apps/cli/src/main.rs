#![deny(warnings)]

//! Headless CLI for the affiliate hub: loads the saved state, prints the
//! results header for a chosen period, and drives import/export.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use hub_core::{EventDraft, EventKind, LeverKey, Period, Quarter};
use hub_state::{AppState, RowUpdate};
use persistence::{DebouncedWriter, SqlitePool, StoredState};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    db: Option<String>,
    period: Option<String>,
    export_csv: Option<PathBuf>,
    export_backup: Option<PathBuf>,
    import_backup: Option<PathBuf>,
    seed_demo: bool,
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--db" => args.db = it.next(),
            "--period" => args.period = it.next(),
            "--export-csv" => args.export_csv = it.next().map(PathBuf::from),
            "--export-backup" => args.export_backup = it.next().map(PathBuf::from),
            "--import-backup" => args.import_backup = it.next().map(PathBuf::from),
            "--seed-demo" => args.seed_demo = true,
            _ => {}
        }
    }
    args
}

async fn save_all(pool: &SqlitePool, stored: &StoredState) -> Result<()> {
    persistence::save_blob(pool, persistence::BLOB_PLANNING, &stored.planning).await?;
    persistence::save_blob(pool, persistence::BLOB_RESULTS, &stored.results).await?;
    persistence::save_blob(pool, persistence::BLOB_QUARTER_TARGETS, &stored.quarter_targets)
        .await?;
    persistence::save_blob(pool, persistence::BLOB_QUARTER_ACTUALS, &stored.quarter_actuals)
        .await?;
    Ok(())
}

/// Seeds a small demo quarter: two categorized affiliates, a linked class
/// with measured results, and Q2 figures. Row edits go through the debounced
/// writer the same way interactive edits do.
async fn seed_demo(state: &mut AppState, pool: &SqlitePool) -> Result<()> {
    state
        .categories
        .set_members(LeverKey::Comunidad, ["Orange", "Vivi Garcia"]);
    state
        .categories
        .set_members(LeverKey::Tradicional, ["Jairo García"]);

    let clase_id = state.planning.add(EventDraft {
        affiliate: "Orange".into(),
        kind: EventKind::Clase,
        date: NaiveDate::from_ymd_opt(2026, 4, 2),
        end_date: None,
        projected_nps: 6,
    })?;
    state.planning.add(EventDraft {
        affiliate: "Jairo García".into(),
        kind: EventKind::Convocatoria,
        date: NaiveDate::from_ymd_opt(2026, 4, 6),
        end_date: NaiveDate::from_ymd_opt(2026, 4, 17),
        projected_nps: 10,
    })?;

    let row_id = state.link_event_to_results(clase_id)?;
    let mut writer = DebouncedWriter::new(pool.clone(), persistence::BLOB_RESULTS);
    let updates = [
        RowUpdate::WaGroup(100),
        RowUpdate::Attendees(40),
        RowUpdate::Trials(20),
        RowUpdate::Nps(5),
        RowUpdate::Fixed(100_000),
        RowUpdate::Variable(50_000),
        RowUpdate::Pauta(25_000),
        RowUpdate::Confirmed(true),
    ];
    for update in updates {
        state.results.apply(row_id, update)?;
        writer.schedule(state.results.rows())?;
    }
    writer.flush().await?;

    state.quarters.set_target(Quarter::Q2, 50);
    state.quarters.set_actual(Quarter::Q2, 30);
    persistence::save_blob(pool, persistence::BLOB_PLANNING, &state.planning_doc()).await?;
    persistence::save_blob(pool, persistence::BLOB_QUARTER_TARGETS, &state.quarters.targets)
        .await?;
    persistence::save_blob(pool, persistence::BLOB_QUARTER_ACTUALS, &state.quarters.actuals)
        .await?;
    info!("demo data seeded");
    Ok(())
}

fn print_summary(state: &AppState) {
    let summary = state.result_summary();
    println!(
        "Hub OK | eventos: {} | filas: {} | afiliados: {}",
        state.planning.events().len(),
        state.results.rows().len(),
        state.filter.affiliate_options(&state.categories).len()
    );
    println!(
        "Resultados [{}] | NPs: {} | acciones: {} | proy: {} | total: {} | inversion COP: {} | CAC acciones: ${:.2} | CAC general: ${:.2}",
        state.filter.period,
        summary.display_nps,
        summary.acciones_nps,
        summary.projected,
        summary.combined,
        summary.investment,
        summary.cac_acciones,
        summary.cac_general
    );
    for card in &summary.quarters {
        println!(
            "{} | tableau: {} | meta: {} | proy: {} | delta: {:+} | forecast: {:+} | CAC acc: ${:.2} | CAC gen: ${:.2}",
            card.quarter,
            card.actual,
            card.target,
            card.projected,
            card.delta.actual.delta,
            card.delta.forecast.delta,
            card.cac_acciones,
            card.cac_general
        );
    }
    for (lever, stats) in &summary.levers {
        println!("palanca {} | NPs: {} | acciones: {}", lever, stats.nps, stats.rows);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args();
    info!(git_sha = env!("GIT_SHA"), "starting affiliate hub");

    let url = match &args.db {
        Some(db) => db.clone(),
        None => {
            std::fs::create_dir_all("saves").context("creating saves directory")?;
            persistence::default_sqlite_url().to_string()
        }
    };
    let pool = persistence::init_db(&url).await?;
    let mut stored = persistence::load_all(&pool).await?;

    if let Some(path) = &args.import_backup {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let backup = hub_io::parse_backup(&json)?;
        hub_io::apply_backup(
            backup,
            &mut stored.planning,
            &mut stored.results,
            &mut stored.quarter_targets,
            &mut stored.quarter_actuals,
        );
        save_all(&pool, &stored).await?;
        info!(path = %path.display(), "backup restored");
    }

    let mut state = AppState::from_parts(
        stored.planning,
        stored.results,
        stored.quarter_targets,
        stored.quarter_actuals,
    );
    if args.seed_demo && state.planning.events().is_empty() && state.results.rows().is_empty() {
        seed_demo(&mut state, &pool).await?;
    }
    if let Some(token) = &args.period {
        state.filter.period = Period::parse(token);
    }

    print_summary(&state);

    if let Some(path) = &args.export_csv {
        let bytes = hub_io::csv_report(state.results.rows())?;
        std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "csv report written");
    }
    if let Some(path) = &args.export_backup {
        let doc = state.planning_doc();
        let backup = hub_io::make_backup(
            &doc,
            state.results.rows(),
            &state.quarters.targets,
            &state.quarters.actuals,
        );
        std::fs::write(path, hub_io::backup_json(&backup)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "backup written");
    }

    Ok(())
}
