#![deny(warnings)]

//! In-memory application state for the affiliate hub: the planning store,
//! the results ledger, the filter selectors, and the quarterly target
//! tracker, plus the combined [`AppState`] the app surface queries.
//!
//! All mutation is synchronous; persistence is the caller's concern (the
//! stores hand out snapshot clones of the aggregates they own).

use chrono::{Datelike, NaiveDate};
use hub_core::{
    fresh_id, CategorySet, Event, EventDraft, EventKind, LeverKey, Period, PlanningDoc, Quarter,
    QuarterFigures, ResultRow, ValidationError,
};
use hub_metrics::{
    cac_usd, confirmed_investment, confirmed_nps, nps_sum, projected_sum, rollup_by_lever,
    rollup_by_quarter, target_delta, total_investment, LeverStats, TargetDelta,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;
use tracing::debug;

/// Errors from store operations.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    #[error("event {0} not found")]
    EventNotFound(i64),
    #[error("result row {0} not found")]
    RowNotFound(i64),
    /// The event already has a matching result row.
    #[error("event {0} is already linked to a result row")]
    AlreadyLinked(i64),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Event-type selector: an empty set means "all types".
///
/// Toggling a concrete type drops the all marker; emptying the selection
/// resets it back to all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TypeFilter(BTreeSet<EventKind>);

impl TypeFilter {
    pub fn is_all(&self) -> bool {
        self.0.is_empty()
    }

    pub fn select_all(&mut self) {
        self.0.clear();
    }

    pub fn toggle(&mut self, kind: EventKind) {
        if !self.0.remove(&kind) {
            self.0.insert(kind);
        }
        // An empty selection collapses back to "all".
    }

    pub fn matches(&self, kind: EventKind) -> bool {
        self.0.is_empty() || self.0.contains(&kind)
    }

    pub fn active(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.0.iter().copied()
    }
}

/// The four independent selectors combined into predicates.
///
/// The affiliate value is deliberately kept even when it no longer belongs
/// to the selected lever; only the *option list* is recomputed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterState {
    pub lever: Option<LeverKey>,
    pub affiliate: Option<String>,
    pub kinds: TypeFilter,
    pub period: Period,
}

impl FilterState {
    /// Lever card click: selecting the active lever deselects it.
    pub fn toggle_lever(&mut self, key: LeverKey) {
        self.lever = if self.lever == Some(key) { None } else { Some(key) };
    }

    /// The affiliate dropdown options consistent with the lever selector.
    /// Does not touch the stored affiliate value.
    pub fn affiliate_options<'a>(&self, categories: &'a CategorySet) -> Vec<&'a str> {
        categories
            .iter()
            .filter(|(key, _)| self.lever.is_none() || self.lever == Some(*key))
            .flat_map(|(_, c)| c.members.iter().map(String::as_str))
            .collect()
    }

    fn matches_name(&self, categories: &CategorySet, name: &str) -> bool {
        if let Some(aff) = &self.affiliate {
            if aff != name {
                return false;
            }
        }
        if let Some(lever) = self.lever {
            if categories.resolve_lever(name) != Some(lever) {
                return false;
            }
        }
        true
    }

    /// Events filter on lever + affiliate + type.
    pub fn matches_event(&self, categories: &CategorySet, event: &Event) -> bool {
        self.matches_name(categories, &event.affiliate) && self.kinds.matches(event.kind)
    }

    /// Result rows filter on lever + affiliate + period.
    pub fn matches_row(&self, categories: &CategorySet, row: &ResultRow) -> bool {
        self.matches_name(categories, &row.name) && self.period.matches(row.date)
    }

    /// Row filter ignoring the period selector (used by the quarter cards,
    /// which always show all four quarters).
    pub fn matches_row_any_period(&self, categories: &CategorySet, row: &ResultRow) -> bool {
        self.matches_name(categories, &row.name)
    }
}

/// A linkable event with its already-linked annotation.
#[derive(Clone, Copy, Debug)]
pub struct Linkable<'a> {
    pub event: &'a Event,
    pub already_linked: bool,
}

/// Per-quarter clase/contenido counts for the planning stats bar.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QuarterActivity {
    pub clases: usize,
    pub contenidos: usize,
}

/// Planning-side stats for one display month.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ActivityStats {
    pub month_clases: usize,
    pub month_contenidos: usize,
    pub quarters: [QuarterActivity; 4],
    /// Distinct affiliates with month activity, per lever.
    pub lever_affiliates: BTreeMap<LeverKey, usize>,
}

/// Owns the calendar events.
#[derive(Clone, Debug, Default)]
pub struct PlanningStore {
    events: Vec<Event>,
}

impl PlanningStore {
    pub fn new(events: Vec<Event>) -> PlanningStore {
        PlanningStore { events }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn get(&self, id: i64) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Validate and add; nothing is stored when validation fails.
    pub fn add(&mut self, draft: EventDraft) -> Result<i64, StateError> {
        let id = fresh_id(self.events.iter().map(|e| e.id));
        let event = draft.into_event(id)?;
        debug!(id, affiliate = %event.affiliate, "event added");
        self.events.push(event);
        Ok(id)
    }

    /// Full replace of the non-id fields, re-applying the end-date rule.
    pub fn edit(&mut self, id: i64, draft: EventDraft) -> Result<(), StateError> {
        let idx = self
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or(StateError::EventNotFound(id))?;
        self.events[idx] = draft.into_event(id)?;
        Ok(())
    }

    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        self.events.len() != before
    }

    /// Events whose `[date, end_date]` range intersects the window and the
    /// filter accepts.
    pub fn in_window<'a>(
        &'a self,
        from: NaiveDate,
        to: NaiveDate,
        filter: &FilterState,
        categories: &CategorySet,
    ) -> Vec<&'a Event> {
        self.events
            .iter()
            .filter(|e| e.intersects(from, to) && filter.matches_event(categories, e))
            .collect()
    }

    /// Events visible on a single calendar day.
    pub fn on_day<'a>(
        &'a self,
        day: NaiveDate,
        filter: &FilterState,
        categories: &CategorySet,
    ) -> Vec<&'a Event> {
        self.events
            .iter()
            .filter(|e| e.spans(day) && filter.matches_event(categories, e))
            .collect()
    }

    /// Clase/contenido events sorted ascending by date, each annotated with
    /// whether a result row already matches its `(affiliate, date, type)`
    /// key. Linked events are surfaced but not re-linkable.
    pub fn linkable<'a>(&'a self, rows: &[ResultRow]) -> Vec<Linkable<'a>> {
        let existing: HashSet<(String, String, String)> =
            rows.iter().map(ResultRow::link_key).collect();
        let mut out: Vec<Linkable<'a>> = self
            .events
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Clase | EventKind::Contenido))
            .map(|e| Linkable {
                event: e,
                already_linked: existing.contains(&(
                    e.affiliate.clone(),
                    e.date.to_string(),
                    e.kind.as_str().to_string(),
                )),
            })
            .collect();
        out.sort_by_key(|l| l.event.date);
        out
    }

    /// Stats for one display month (zero-based), plus the year-wide
    /// per-quarter counts, over the filtered events.
    pub fn monthly_activity(
        &self,
        year: i32,
        month0: u32,
        filter: &FilterState,
        categories: &CategorySet,
    ) -> ActivityStats {
        let in_month = |d: NaiveDate| d.year() == year && d.month0() == month0;
        let mut stats = ActivityStats::default();
        let mut seen: BTreeMap<LeverKey, BTreeSet<&str>> = BTreeMap::new();

        for e in self
            .events
            .iter()
            .filter(|e| filter.matches_event(categories, e))
        {
            let q = Quarter::of(e.date) as usize;
            match e.kind {
                EventKind::Clase => stats.quarters[q].clases += 1,
                EventKind::Contenido => stats.quarters[q].contenidos += 1,
                _ => {}
            }
            if in_month(e.date) || in_month(e.end_date) {
                match e.kind {
                    EventKind::Clase => stats.month_clases += 1,
                    EventKind::Contenido => stats.month_contenidos += 1,
                    _ => {}
                }
                if let Some(lever) = categories.resolve_lever(&e.affiliate) {
                    seen.entry(lever).or_default().insert(&e.affiliate);
                }
            }
        }
        stats.lever_affiliates = seen.into_iter().map(|(k, v)| (k, v.len())).collect();
        stats
    }
}

/// A typed field update for one result row; replaces string-keyed dynamic
/// dispatch with one variant per mutable field.
#[derive(Clone, Debug, PartialEq)]
pub enum RowUpdate {
    Name(String),
    Date(Option<NaiveDate>),
    Kind(String),
    WaGroup(i64),
    Attendees(i64),
    Trials(i64),
    Nps(i64),
    ProjectedNps(i64),
    Confirmed(bool),
    HasCommission(bool),
    Fixed(i64),
    Variable(i64),
    Pauta(i64),
    Notes(String),
}

/// Owns the result rows in insertion order.
#[derive(Clone, Debug, Default)]
pub struct ResultsLedger {
    rows: Vec<ResultRow>,
}

impl ResultsLedger {
    pub fn new(rows: Vec<ResultRow>) -> ResultsLedger {
        ResultsLedger { rows }
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn get(&self, id: i64) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.id == id)
    }

    /// Append a blank manual row.
    pub fn add_blank(&mut self) -> i64 {
        let id = fresh_id(self.rows.iter().map(|r| r.id));
        self.rows.push(ResultRow::blank(id));
        id
    }

    /// Remove a row from every view and the next persisted snapshot.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        self.rows.len() != before
    }

    /// Single edit-and-recompute entry point; derived fields are computed
    /// on demand from the stored inputs. Numeric fields never go negative.
    pub fn apply(&mut self, id: i64, update: RowUpdate) -> Result<(), StateError> {
        let row = self
            .rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StateError::RowNotFound(id))?;
        match update {
            RowUpdate::Name(v) => row.name = v,
            RowUpdate::Date(v) => row.date = v,
            RowUpdate::Kind(v) => row.kind = v,
            RowUpdate::WaGroup(v) => row.wa_group = v.max(0),
            RowUpdate::Attendees(v) => row.attendees = v.max(0),
            RowUpdate::Trials(v) => row.trials = v.max(0),
            RowUpdate::Nps(v) => row.nps = v.max(0),
            RowUpdate::ProjectedNps(v) => row.projected_nps = v.max(0),
            RowUpdate::Confirmed(v) => row.confirmed = v,
            RowUpdate::HasCommission(v) => row.has_commission = v,
            RowUpdate::Fixed(v) => row.fixed = v.max(0),
            RowUpdate::Variable(v) => row.variable = v.max(0),
            RowUpdate::Pauta(v) => row.pauta = v.max(0),
            RowUpdate::Notes(v) => row.notes = v,
        }
        Ok(())
    }

    /// Create a row from a planned event: affiliate becomes the name, the
    /// kind label and projected NPs are copied, nothing is confirmed yet.
    /// Most-recent-first is a display nicety, so the row is prepended.
    pub fn link_event(&mut self, event: &Event) -> i64 {
        let id = fresh_id(self.rows.iter().map(|r| r.id));
        let mut row = ResultRow::blank(id);
        row.name = event.affiliate.clone();
        row.date = Some(event.date);
        row.kind = event.kind.label();
        row.projected_nps = event.projected_nps;
        self.rows.insert(0, row);
        id
    }

    pub fn filtered<'a>(
        &'a self,
        filter: &FilterState,
        categories: &CategorySet,
    ) -> Vec<&'a ResultRow> {
        self.rows
            .iter()
            .filter(|r| filter.matches_row(categories, r))
            .collect()
    }

    /// Filtered rows ordered for display: date ascending, dateless last.
    pub fn sorted_for_display<'a>(
        &'a self,
        filter: &FilterState,
        categories: &CategorySet,
    ) -> Vec<&'a ResultRow> {
        let mut rows = self.filtered(filter, categories);
        rows.sort_by(|a, b| match (a.date, b.date) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (Some(_), None) => std::cmp::Ordering::Less,
            (Some(x), Some(y)) => x.cmp(&y),
        });
        rows
    }
}

/// Both deltas for one quarter card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct QuarterDelta {
    /// Manual actual vs manual target.
    pub actual: TargetDelta,
    /// (Actual + unconfirmed projection) vs target.
    pub forecast: TargetDelta,
}

/// The manual quarterly targets and actuals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuarterTracker {
    pub targets: QuarterFigures,
    pub actuals: QuarterFigures,
}

impl QuarterTracker {
    pub fn set_target(&mut self, q: Quarter, value: i64) {
        self.targets.set(q, value);
    }

    pub fn set_actual(&mut self, q: Quarter, value: i64) {
        self.actuals.set(q, value);
    }

    /// The NPs figure the header displays. A quarter filter shows that
    /// quarter's manual actual (the external dashboard figure wins over the
    /// row sum); "all" sums the four actuals; a month filter falls back to
    /// the row-summed NPs since no manual monthly figure exists.
    pub fn display_nps(&self, period: Period, row_sum: i64) -> i64 {
        match period {
            Period::Quarter(q) => self.actuals.get(q),
            Period::All => self.actuals.total(),
            Period::Month(_) => row_sum,
        }
    }

    pub fn delta(&self, q: Quarter, unconfirmed_projection: i64) -> QuarterDelta {
        let actual = self.actuals.get(q);
        let target = self.targets.get(q);
        QuarterDelta {
            actual: target_delta(actual, target),
            forecast: target_delta(actual + unconfirmed_projection, target),
        }
    }
}

/// One quarter card of the results header.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct QuarterCard {
    pub quarter: Quarter,
    /// Manual actual ("tableau") figure.
    pub actual: i64,
    /// Manual target ("meta") figure.
    pub target: i64,
    /// Unconfirmed projected NPs in the quarter.
    pub projected: i64,
    pub delta: QuarterDelta,
    pub cac_acciones: Decimal,
    pub cac_general: Decimal,
}

/// Everything the results header shows for the active filters.
#[derive(Clone, Debug, Serialize)]
pub struct ResultSummary {
    /// The authoritative displayed NPs figure (see `display_nps`).
    pub display_nps: i64,
    /// NPs summed from the visible rows ("acciones").
    pub acciones_nps: i64,
    /// Unconfirmed projected NPs of the visible rows.
    pub projected: i64,
    /// display_nps + projected.
    pub combined: i64,
    /// Total investment over the visible rows, confirmed or not.
    pub investment: i64,
    /// Ratio-of-sums CAC against the confirmed row NPs.
    pub cac_acciones: Decimal,
    /// Ratio-of-sums CAC against the displayed NPs figure.
    pub cac_general: Decimal,
    pub quarters: Vec<QuarterCard>,
    pub levers: BTreeMap<LeverKey, LeverStats>,
}

/// The whole single-user application state.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub categories: CategorySet,
    pub planning: PlanningStore,
    pub results: ResultsLedger,
    pub quarters: QuarterTracker,
    pub filter: FilterState,
}

impl AppState {
    pub fn from_parts(
        planning: PlanningDoc,
        results: Vec<ResultRow>,
        targets: QuarterFigures,
        actuals: QuarterFigures,
    ) -> AppState {
        AppState {
            categories: planning.categories,
            planning: PlanningStore::new(planning.events),
            results: ResultsLedger::new(results),
            quarters: QuarterTracker { targets, actuals },
            filter: FilterState::default(),
        }
    }

    /// Snapshot of the persisted planning aggregate.
    pub fn planning_doc(&self) -> PlanningDoc {
        PlanningDoc {
            events: self.planning.events().to_vec(),
            categories: self.categories.clone(),
        }
    }

    /// Link a planned event into the results ledger. Fails when the event
    /// no longer exists or when a row with the same derived key already
    /// exists (the key set is recomputed here, not stored).
    pub fn link_event_to_results(&mut self, event_id: i64) -> Result<i64, StateError> {
        let event = self
            .planning
            .get(event_id)
            .ok_or(StateError::EventNotFound(event_id))?
            .clone();
        let key = (
            event.affiliate.clone(),
            event.date.to_string(),
            event.kind.as_str().to_string(),
        );
        if self.results.rows().iter().any(|r| r.link_key() == key) {
            return Err(StateError::AlreadyLinked(event_id));
        }
        Ok(self.results.link_event(&event))
    }

    /// Compute the results header for the active filters.
    pub fn result_summary(&self) -> ResultSummary {
        let period_rows = self.results.filtered(&self.filter, &self.categories);
        let any_period: Vec<&ResultRow> = self
            .results
            .rows()
            .iter()
            .filter(|r| self.filter.matches_row_any_period(&self.categories, r))
            .collect();

        let acciones_nps = nps_sum(period_rows.iter().copied());
        let projected = projected_sum(period_rows.iter().copied());
        let display_nps = self.quarters.display_nps(self.filter.period, acciones_nps);
        let investment: i64 = period_rows.iter().copied().map(total_investment).sum();
        let cac_inv = confirmed_investment(period_rows.iter().copied());
        let cac_nps = confirmed_nps(period_rows.iter().copied());

        // Quarter cards ignore the period selector: all four stay visible.
        let rollups = rollup_by_quarter(any_period.iter().copied());
        let quarters = rollups
            .iter()
            .map(|(q, roll)| QuarterCard {
                quarter: q,
                actual: self.quarters.actuals.get(q),
                target: self.quarters.targets.get(q),
                projected: roll.projected,
                delta: self.quarters.delta(q, roll.projected),
                cac_acciones: roll.cac_acciones(),
                cac_general: roll.cac_general(self.quarters.actuals.get(q)),
            })
            .collect();

        ResultSummary {
            display_nps,
            acciones_nps,
            projected,
            combined: display_nps + projected,
            investment,
            cac_acciones: cac_usd(cac_inv, cac_nps),
            cac_general: cac_usd(cac_inv, display_nps),
            quarters,
            levers: rollup_by_lever(period_rows, &self.categories),
        }
    }
}
