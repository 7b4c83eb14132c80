#![deny(warnings)]

//! Core domain models and invariants for the affiliate hub.
//!
//! This crate defines the serializable types shared across the workspace:
//! the lever/category registry, planned calendar events, result rows, and
//! the quarter/period vocabulary, together with validation helpers that
//! guarantee the basic invariants. Wire field names match the persisted
//! storage schema so saved blobs and backups stay interchangeable.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The four affiliate levers, in fixed declaration order.
///
/// Name resolution walks this order, so a name present in two member lists
/// resolves to the earliest lever.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeverKey {
    Comunidad,
    Tradicional,
    Alianza,
    Dropshipping,
}

impl LeverKey {
    /// All levers in declaration order.
    pub const ALL: [LeverKey; 4] = [
        LeverKey::Comunidad,
        LeverKey::Tradicional,
        LeverKey::Alianza,
        LeverKey::Dropshipping,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeverKey::Comunidad => "comunidad",
            LeverKey::Tradicional => "tradicional",
            LeverKey::Alianza => "alianza",
            LeverKey::Dropshipping => "dropshipping",
        }
    }

    pub fn parse(s: &str) -> Option<LeverKey> {
        LeverKey::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for LeverKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lever's label and member roster.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Category {
    /// Human-readable label, e.g. "Comunidad".
    pub label: String,
    /// Affiliate names, order as entered. Uniqueness across categories is
    /// not enforced; resolution takes the earliest lever.
    #[serde(default)]
    pub members: Vec<String>,
    /// Optional display color (hex string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Category {
    fn labeled(label: &str) -> Category {
        Category {
            label: label.to_string(),
            members: Vec::new(),
            color: None,
        }
    }
}

/// The fixed registry of four categories, keyed by lever.
///
/// Serialized as an object keyed `comunidad`/`tradicional`/`alianza`/
/// `dropshipping`, matching the persisted planning blob.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategorySet {
    pub comunidad: Category,
    pub tradicional: Category,
    pub alianza: Category,
    pub dropshipping: Category,
}

impl Default for CategorySet {
    fn default() -> Self {
        CategorySet {
            comunidad: Category::labeled("Comunidad"),
            tradicional: Category::labeled("Tradicional"),
            alianza: Category::labeled("Alianza"),
            dropshipping: Category::labeled("Dropshipping"),
        }
    }
}

/// Partial registry used by backup and paste imports: absent keys leave the
/// existing category untouched, unknown keys are ignored by serde.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PartialCategorySet {
    #[serde(default)]
    pub comunidad: Option<Category>,
    #[serde(default)]
    pub tradicional: Option<Category>,
    #[serde(default)]
    pub alianza: Option<Category>,
    #[serde(default)]
    pub dropshipping: Option<Category>,
}

impl CategorySet {
    pub fn get(&self, key: LeverKey) -> &Category {
        match key {
            LeverKey::Comunidad => &self.comunidad,
            LeverKey::Tradicional => &self.tradicional,
            LeverKey::Alianza => &self.alianza,
            LeverKey::Dropshipping => &self.dropshipping,
        }
    }

    pub fn get_mut(&mut self, key: LeverKey) -> &mut Category {
        match key {
            LeverKey::Comunidad => &mut self.comunidad,
            LeverKey::Tradicional => &mut self.tradicional,
            LeverKey::Alianza => &mut self.alianza,
            LeverKey::Dropshipping => &mut self.dropshipping,
        }
    }

    /// Iterate categories in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (LeverKey, &Category)> + '_ {
        LeverKey::ALL.into_iter().map(move |k| (k, self.get(k)))
    }

    /// First lever whose member list contains `name` exactly, or `None` when
    /// the name is not categorized yet.
    pub fn resolve_lever(&self, name: &str) -> Option<LeverKey> {
        self.iter()
            .find(|(_, c)| c.members.iter().any(|m| m == name))
            .map(|(k, _)| k)
    }

    /// Replace a member roster verbatim: surrounding whitespace trimmed,
    /// blank entries dropped, everything else kept as given.
    pub fn set_members<I, S>(&mut self, key: LeverKey, members: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.get_mut(key).members = members
            .into_iter()
            .map(|m| m.as_ref().trim().to_string())
            .filter(|m| !m.is_empty())
            .collect();
    }

    /// Key-by-key merge used by imports.
    pub fn merge(&mut self, partial: PartialCategorySet) {
        if let Some(c) = partial.comunidad {
            self.comunidad = c;
        }
        if let Some(c) = partial.tradicional {
            self.tradicional = c;
        }
        if let Some(c) = partial.alianza {
            self.alianza = c;
        }
        if let Some(c) = partial.dropshipping {
            self.dropshipping = c;
        }
    }
}

/// Kinds of planned actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Convocatoria,
    Clase,
    Contenido,
    Cierre,
}

impl EventKind {
    /// Every kind except an enrollment window spans exactly one day.
    pub fn is_single_day(self) -> bool {
        !matches!(self, EventKind::Convocatoria)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Convocatoria => "convocatoria",
            EventKind::Clase => "clase",
            EventKind::Contenido => "contenido",
            EventKind::Cierre => "cierre",
        }
    }

    /// Capitalized label used for the free-form `type` of a linked result
    /// row, e.g. "Clase".
    pub fn label(self) -> String {
        let s = self.as_str();
        let mut out = String::with_capacity(s.len());
        let mut chars = s.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
        out
    }
}

/// A planned action on the calendar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique id, creation timestamp in milliseconds.
    pub id: i64,
    /// Affiliate name; a soft reference into the category rosters.
    pub affiliate: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Start date.
    pub date: NaiveDate,
    /// Inclusive end date; equals `date` for single-day kinds.
    #[serde(rename = "endDate")]
    pub end_date: NaiveDate,
    #[serde(rename = "projectedNps", default)]
    pub projected_nps: i64,
}

impl Event {
    /// Whether the event is visible on `day`.
    pub fn spans(&self, day: NaiveDate) -> bool {
        self.date <= day && day <= self.end_date
    }

    /// Whether `[date, end_date]` intersects `[from, to]`.
    pub fn intersects(&self, from: NaiveDate, to: NaiveDate) -> bool {
        self.date <= to && self.end_date >= from
    }
}

/// A measured outcome row. Field names mirror the persisted schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Optional action date; the empty string on the wire means "no date".
    #[serde(default, with = "date_str")]
    pub date: Option<NaiveDate>,
    /// Free-form action label, e.g. "Clase".
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub wa_group: i64,
    #[serde(default)]
    pub attendees: i64,
    #[serde(default)]
    pub trials: i64,
    #[serde(default)]
    pub nps: i64,
    #[serde(rename = "projectedNps", default)]
    pub projected_nps: i64,
    #[serde(default)]
    pub confirmed: bool,
    /// Absent on the wire means commission applies; only an explicit
    /// `false` turns it off.
    #[serde(rename = "hasCommission", default = "default_true")]
    pub has_commission: bool,
    #[serde(default)]
    pub fixed: i64,
    #[serde(default)]
    pub variable: i64,
    #[serde(default)]
    pub pauta: i64,
    #[serde(default)]
    pub notes: String,
}

fn default_true() -> bool {
    true
}

impl ResultRow {
    /// A blank manual row.
    pub fn blank(id: i64) -> ResultRow {
        ResultRow {
            id,
            name: String::new(),
            date: None,
            kind: "Clase".to_string(),
            wa_group: 0,
            attendees: 0,
            trials: 0,
            nps: 0,
            projected_nps: 0,
            confirmed: false,
            has_commission: true,
            fixed: 0,
            variable: 0,
            pauta: 0,
            notes: String::new(),
        }
    }

    /// Derived key that ties a row back to the event it was linked from:
    /// `(name, date, lowercase type)`. No back-reference is stored.
    pub fn link_key(&self) -> (String, String, String) {
        (
            self.name.clone(),
            self.date.map(|d| d.to_string()).unwrap_or_default(),
            self.kind.to_lowercase(),
        )
    }
}

/// Serde adapter: `Option<NaiveDate>` as an ISO string, empty for `None`.
mod date_str {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_str(&d.to_string()),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom)
    }
}

/// Calendar quarters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Quarter containing a zero-based month index.
    pub fn from_month0(month0: u32) -> Quarter {
        match month0 {
            0..=2 => Quarter::Q1,
            3..=5 => Quarter::Q2,
            6..=8 => Quarter::Q3,
            _ => Quarter::Q4,
        }
    }

    pub fn of(date: NaiveDate) -> Quarter {
        Quarter::from_month0(date.month0())
    }

    /// The quarter's three zero-based month indices.
    pub fn months0(self) -> [u32; 3] {
        match self {
            Quarter::Q1 => [0, 1, 2],
            Quarter::Q2 => [3, 4, 5],
            Quarter::Q3 => [6, 7, 8],
            Quarter::Q4 => [9, 10, 11],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Quarter::Q1 => "Q1",
            Quarter::Q2 => "Q2",
            Quarter::Q3 => "Q3",
            Quarter::Q4 => "Q4",
        }
    }
}

impl std::fmt::Display for Quarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Four manually entered quarterly figures (targets or actuals).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarterFigures {
    #[serde(rename = "Q1", default)]
    pub q1: i64,
    #[serde(rename = "Q2", default)]
    pub q2: i64,
    #[serde(rename = "Q3", default)]
    pub q3: i64,
    #[serde(rename = "Q4", default)]
    pub q4: i64,
}

/// Partial quarterly figures for key-by-key merge on import.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct PartialQuarterFigures {
    #[serde(rename = "Q1", default)]
    pub q1: Option<i64>,
    #[serde(rename = "Q2", default)]
    pub q2: Option<i64>,
    #[serde(rename = "Q3", default)]
    pub q3: Option<i64>,
    #[serde(rename = "Q4", default)]
    pub q4: Option<i64>,
}

impl QuarterFigures {
    pub fn get(&self, q: Quarter) -> i64 {
        match q {
            Quarter::Q1 => self.q1,
            Quarter::Q2 => self.q2,
            Quarter::Q3 => self.q3,
            Quarter::Q4 => self.q4,
        }
    }

    pub fn set(&mut self, q: Quarter, value: i64) {
        match q {
            Quarter::Q1 => self.q1 = value,
            Quarter::Q2 => self.q2 = value,
            Quarter::Q3 => self.q3 = value,
            Quarter::Q4 => self.q4 = value,
        }
    }

    pub fn total(&self) -> i64 {
        self.q1 + self.q2 + self.q3 + self.q4
    }

    pub fn merge(&mut self, partial: PartialQuarterFigures) {
        if let Some(v) = partial.q1 {
            self.q1 = v;
        }
        if let Some(v) = partial.q2 {
            self.q2 = v;
        }
        if let Some(v) = partial.q3 {
            self.q3 = v;
        }
        if let Some(v) = partial.q4 {
            self.q4 = v;
        }
    }
}

/// A result-period selector token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Period {
    #[default]
    All,
    Quarter(Quarter),
    /// Zero-based month index.
    Month(u32),
}

impl Period {
    /// Parse a period token: "all", "Q1".."Q4", or a month index "0".."11".
    /// Anything else means no restriction.
    pub fn parse(token: &str) -> Period {
        match token {
            "all" => Period::All,
            "Q1" => Period::Quarter(Quarter::Q1),
            "Q2" => Period::Quarter(Quarter::Q2),
            "Q3" => Period::Quarter(Quarter::Q3),
            "Q4" => Period::Quarter(Quarter::Q4),
            other => match other.parse::<u32>() {
                Ok(m) if m <= 11 => Period::Month(m),
                _ => Period::All,
            },
        }
    }

    /// The restricted zero-based month set, or `None` for no restriction.
    pub fn months0(&self) -> Option<Vec<u32>> {
        match self {
            Period::All => None,
            Period::Quarter(q) => Some(q.months0().to_vec()),
            Period::Month(m) => Some(vec![*m]),
        }
    }

    /// A missing date always matches; otherwise the date's month must fall
    /// in the restricted set.
    pub fn matches(&self, date: Option<NaiveDate>) -> bool {
        match (self.months0(), date) {
            (None, _) | (_, None) => true,
            (Some(months), Some(d)) => months.contains(&d.month0()),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::All => f.write_str("all"),
            Period::Quarter(q) => write!(f, "{q}"),
            Period::Month(m) => write!(f, "{m}"),
        }
    }
}

/// ISO-8601 week number (weeks start Monday, week 1 holds the first
/// Thursday of the year).
pub fn iso_week(date: NaiveDate) -> u32 {
    date.iso_week().week()
}

/// Forgiving numeric entry: strip every non-digit and parse, 0 on anything
/// unparseable. Mirrors how the hub coerces pasted or formatted values.
pub fn parse_loose_int(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// A fresh unique id: the current timestamp in milliseconds, bumped past the
/// largest id already in use so same-millisecond creations stay distinct.
pub fn fresh_id<I: IntoIterator<Item = i64>>(existing: I) -> i64 {
    let max = existing.into_iter().max().unwrap_or(0);
    Utc::now().timestamp_millis().max(max + 1)
}

/// The persisted planning aggregate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningDoc {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub categories: CategorySet,
}

/// Validation errors raised when saving an event.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The affiliate selector was left empty.
    #[error("an affiliate is required")]
    MissingAffiliate,
    /// The start date was left empty.
    #[error("a start date is required")]
    MissingDate,
    /// End date precedes the start date.
    #[error("end date {end} precedes start date {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
}

/// Mutable event fields as entered in the editor; validated and normalized
/// into an [`Event`] on save.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDraft {
    pub affiliate: String,
    pub kind: EventKind,
    pub date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub projected_nps: i64,
}

impl EventDraft {
    /// Validate and normalize: single-day kinds force `end_date == date`;
    /// a multi-day end date defaults to the start when absent. Nothing is
    /// saved when validation fails.
    pub fn into_event(self, id: i64) -> Result<Event, ValidationError> {
        if self.affiliate.trim().is_empty() {
            return Err(ValidationError::MissingAffiliate);
        }
        let date = self.date.ok_or(ValidationError::MissingDate)?;
        let end_date = if self.kind.is_single_day() {
            date
        } else {
            self.end_date.unwrap_or(date)
        };
        if end_date < date {
            return Err(ValidationError::EndBeforeStart {
                start: date,
                end: end_date,
            });
        }
        Ok(Event {
            id,
            affiliate: self.affiliate,
            kind: self.kind,
            date,
            end_date,
            projected_nps: self.projected_nps.max(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn lever_resolution_takes_declaration_order() {
        let mut cats = CategorySet::default();
        cats.set_members(LeverKey::Tradicional, ["Vivi Garcia", "Jairo"]);
        cats.set_members(LeverKey::Comunidad, ["Vivi Garcia"]);
        // Duplicate membership is accepted; the earliest lever wins.
        assert_eq!(cats.resolve_lever("Vivi Garcia"), Some(LeverKey::Comunidad));
        assert_eq!(cats.resolve_lever("Jairo"), Some(LeverKey::Tradicional));
        assert_eq!(cats.resolve_lever("Nadie"), None);
    }

    #[test]
    fn set_members_trims_and_drops_blanks() {
        let mut cats = CategorySet::default();
        cats.set_members(LeverKey::Alianza, ["  Dessiré ", "", "   ", "Bold"]);
        assert_eq!(cats.alianza.members, vec!["Dessiré", "Bold"]);
    }

    #[test]
    fn category_merge_is_key_by_key() {
        let mut cats = CategorySet::default();
        cats.set_members(LeverKey::Comunidad, ["Orange"]);
        let partial: PartialCategorySet = serde_json::from_str(
            r#"{"tradicional": {"label": "Tradicional", "members": ["Camilo"]},
                "desconocida": {"label": "X", "members": ["Y"]}}"#,
        )
        .unwrap();
        cats.merge(partial);
        assert_eq!(cats.comunidad.members, vec!["Orange"]);
        assert_eq!(cats.tradicional.members, vec!["Camilo"]);
    }

    #[test]
    fn quarter_of_month_boundaries() {
        assert_eq!(Quarter::of(d("2026-03-31")), Quarter::Q1);
        assert_eq!(Quarter::of(d("2026-04-01")), Quarter::Q2);
        assert_eq!(Quarter::from_month0(2), Quarter::Q1);
        assert_eq!(Quarter::from_month0(3), Quarter::Q2);
        assert_eq!(Quarter::from_month0(11), Quarter::Q4);
    }

    #[test]
    fn period_parse_and_match() {
        assert_eq!(Period::parse("all"), Period::All);
        assert_eq!(Period::parse("Q3"), Period::Quarter(Quarter::Q3));
        assert_eq!(Period::parse("7"), Period::Month(7));
        // Unknown tokens and out-of-range months mean no restriction.
        assert_eq!(Period::parse("Q5"), Period::All);
        assert_eq!(Period::parse("12"), Period::All);

        let aug = Some(d("2026-08-15"));
        assert!(Period::parse("Q3").matches(aug));
        assert!(!Period::parse("Q4").matches(aug));
        assert!(Period::parse("7").matches(aug));
        assert!(!Period::parse("6").matches(aug));
        // A missing date is always visible.
        assert!(Period::parse("Q1").matches(None));
    }

    #[test]
    fn iso_week_uses_first_thursday_rule() {
        // 2026-01-01 is a Thursday, so it belongs to week 1.
        assert_eq!(iso_week(d("2026-01-01")), 1);
        // A year starting on Thursday has 53 ISO weeks.
        assert_eq!(iso_week(d("2026-12-28")), 53);
        assert_eq!(iso_week(d("2026-01-05")), 2);
    }

    #[test]
    fn draft_normalizes_end_date_by_kind() {
        let draft = EventDraft {
            affiliate: "Orange".into(),
            kind: EventKind::Clase,
            date: Some(d("2026-02-10")),
            end_date: Some(d("2026-02-20")),
            projected_nps: 3,
        };
        let ev = draft.into_event(1).unwrap();
        assert_eq!(ev.end_date, ev.date);

        let draft = EventDraft {
            affiliate: "Orange".into(),
            kind: EventKind::Convocatoria,
            date: Some(d("2026-02-10")),
            end_date: Some(d("2026-02-20")),
            projected_nps: 0,
        };
        let ev = draft.into_event(2).unwrap();
        assert_eq!(ev.end_date, d("2026-02-20"));
        assert!(ev.spans(d("2026-02-15")));
        assert!(!ev.spans(d("2026-02-21")));
    }

    #[test]
    fn draft_validation_blocks_bad_saves() {
        let missing_aff = EventDraft {
            affiliate: "   ".into(),
            kind: EventKind::Clase,
            date: Some(d("2026-02-10")),
            end_date: None,
            projected_nps: 0,
        };
        assert_eq!(
            missing_aff.into_event(1),
            Err(ValidationError::MissingAffiliate)
        );

        let missing_date = EventDraft {
            affiliate: "Orange".into(),
            kind: EventKind::Clase,
            date: None,
            end_date: None,
            projected_nps: 0,
        };
        assert_eq!(missing_date.into_event(1), Err(ValidationError::MissingDate));

        let inverted = EventDraft {
            affiliate: "Orange".into(),
            kind: EventKind::Convocatoria,
            date: Some(d("2026-02-10")),
            end_date: Some(d("2026-02-01")),
            projected_nps: 0,
        };
        assert!(matches!(
            inverted.into_event(1),
            Err(ValidationError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn result_row_wire_schema_round_trips() {
        let raw = r#"{"id": 1700000000000, "name": "Orange", "date": "2026-03-05",
            "type": "Clase", "wa_group": 100, "attendees": 40, "trials": 20,
            "nps": 5, "projectedNps": 8, "confirmed": true,
            "fixed": 100000, "variable": 50000, "pauta": 25000, "notes": ""}"#;
        let row: ResultRow = serde_json::from_str(raw).unwrap();
        // hasCommission absent on the wire means "commission on".
        assert!(row.has_commission);
        assert_eq!(row.date, Some(d("2026-03-05")));
        assert_eq!(row.link_key(), ("Orange".into(), "2026-03-05".into(), "clase".into()));

        let json = serde_json::to_string(&row).unwrap();
        let back: ResultRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);

        // An explicit false survives the round trip.
        let off: ResultRow =
            serde_json::from_str(r#"{"id": 2, "hasCommission": false, "date": ""}"#).unwrap();
        assert!(!off.has_commission);
        assert_eq!(off.date, None);
        let back: ResultRow = serde_json::from_str(&serde_json::to_string(&off).unwrap()).unwrap();
        assert!(!back.has_commission);
    }

    #[test]
    fn event_wire_schema_uses_original_names() {
        let ev = Event {
            id: 42,
            affiliate: "Bold".into(),
            kind: EventKind::Convocatoria,
            date: d("2026-05-01"),
            end_date: d("2026-05-07"),
            projected_nps: 10,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "convocatoria");
        assert_eq!(json["endDate"], "2026-05-07");
        assert_eq!(json["projectedNps"], 10);
        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }

    #[test]
    fn loose_int_coerces_garbage_to_zero() {
        assert_eq!(parse_loose_int("1.234.567"), 1_234_567);
        assert_eq!(parse_loose_int("$ 43,575"), 43_575);
        assert_eq!(parse_loose_int("abc"), 0);
        assert_eq!(parse_loose_int(""), 0);
    }

    #[test]
    fn fresh_ids_stay_unique_within_a_millisecond() {
        let a = fresh_id([]);
        let b = fresh_id([a]);
        let c = fresh_id([a, b]);
        assert!(b > a);
        assert!(c > b);
    }

    #[test]
    fn quarter_figures_merge_per_key() {
        let mut figures = QuarterFigures {
            q1: 10,
            q2: 20,
            q3: 30,
            q4: 40,
        };
        let partial: PartialQuarterFigures =
            serde_json::from_str(r#"{"Q2": 25, "Q4": 45}"#).unwrap();
        figures.merge(partial);
        assert_eq!((figures.q1, figures.q2, figures.q3, figures.q4), (10, 25, 30, 45));
        assert_eq!(figures.total(), 110);
    }

    proptest! {
        #[test]
        fn period_month_match_agrees_with_quarter(month0 in 0u32..12, day in 1u32..28) {
            let date = NaiveDate::from_ymd_opt(2026, month0 + 1, day).unwrap();
            let q = Quarter::of(date);
            prop_assert!(Period::Quarter(q).matches(Some(date)));
            prop_assert!(Period::Month(month0).matches(Some(date)));
            for other in Quarter::ALL {
                if other != q {
                    prop_assert!(!Period::Quarter(other).matches(Some(date)));
                }
            }
        }

        #[test]
        fn loose_int_never_panics(raw in "\\PC{0,18}") {
            let _ = parse_loose_int(&raw);
        }
    }
}
