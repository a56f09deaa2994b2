use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

/// Report granularity offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportLevel {
    Oem,
    State,
    Rto,
}

impl ReportLevel {
    pub const ALL: [ReportLevel; 3] = [ReportLevel::Oem, ReportLevel::State, ReportLevel::Rto];

    pub fn dir_name(self) -> &'static str {
        match self {
            ReportLevel::Oem => "oem",
            ReportLevel::State => "state",
            ReportLevel::Rto => "rto",
        }
    }

    /// Whether units of this level carry a child dimension sourced from a manifest.
    pub fn has_children(self) -> bool {
        !matches!(self, ReportLevel::State)
    }

    pub fn child_name(self) -> Option<&'static str> {
        match self {
            ReportLevel::Oem => Some("category"),
            ReportLevel::State => None,
            ReportLevel::Rto => Some("office"),
        }
    }
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

impl FromStr for ReportLevel {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "oem" => Ok(ReportLevel::Oem),
            "state" => Ok(ReportLevel::State),
            "rto" => Ok(ReportLevel::Rto),
            _ => Err(HarvestError::InvalidLevel(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Month {
    Jan,
    Feb,
    Mar,
    Apr,
    May,
    Jun,
    Jul,
    Aug,
    Sep,
    Oct,
    Nov,
    Dec,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::Jan,
        Month::Feb,
        Month::Mar,
        Month::Apr,
        Month::May,
        Month::Jun,
        Month::Jul,
        Month::Aug,
        Month::Sep,
        Month::Oct,
        Month::Nov,
        Month::Dec,
    ];

    /// Label as shown in the dashboard's month selector.
    pub fn label(self) -> &'static str {
        match self {
            Month::Jan => "JAN",
            Month::Feb => "FEB",
            Month::Mar => "MAR",
            Month::Apr => "APR",
            Month::May => "MAY",
            Month::Jun => "JUN",
            Month::Jul => "JUL",
            Month::Aug => "AUG",
            Month::Sep => "SEP",
            Month::Oct => "OCT",
            Month::Nov => "NOV",
            Month::Dec => "DEC",
        }
    }

    pub fn number(self) -> u32 {
        self as u32 + 1
    }

    pub fn from_number(number: u32) -> Option<Self> {
        number
            .checked_sub(1)
            .and_then(|index| Month::ALL.get(index as usize).copied())
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Month {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase();
        if let Some(month) = Month::ALL.iter().find(|m| m.label() == normalized) {
            return Ok(*month);
        }
        normalized
            .parse::<u32>()
            .ok()
            .and_then(Month::from_number)
            .ok_or_else(|| HarvestError::InvalidMonth(value.to_string()))
    }
}

impl Serialize for Month {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Year(u16);

impl Year {
    pub const MIN: u16 = 1990;
    pub const MAX: u16 = 2100;

    pub fn new(value: u16) -> Result<Self, HarvestError> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(HarvestError::InvalidYear(value.to_string()));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Year {
    type Error = HarvestError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Year::new(value)
    }
}

impl From<Year> for u16 {
    fn from(value: Year) -> Self {
        value.0
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Year {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parsed = value
            .trim()
            .parse::<u16>()
            .map_err(|_| HarvestError::InvalidYear(value.to_string()))?;
        Year::new(parsed)
    }
}

/// One reporting month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: Year,
    pub month: Month,
}

impl Period {
    pub fn new(year: Year, month: Month) -> Self {
        Self { year, month }
    }

    /// The calendar month before the one containing `today`.
    pub fn previous_month(today: NaiveDate) -> Result<Self, HarvestError> {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        let year = u16::try_from(year).map_err(|_| HarvestError::InvalidYear(year.to_string()))?;
        let month =
            Month::from_number(month).ok_or_else(|| HarvestError::InvalidMonth(month.to_string()))?;
        Ok(Self::new(Year::new(year)?, month))
    }

    /// Year-major cross product of `years` and `months`.
    pub fn grid(years: &[Year], months: &[Month]) -> Vec<Period> {
        years
            .iter()
            .flat_map(|year| months.iter().map(move |month| Period::new(*year, *month)))
            .collect()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.month, self.year)
    }
}

static OFFICE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*) - ([A-Z0-9]+)\(").expect("office label pattern is valid")
});
static NON_STATE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z\s]").expect("state pattern is valid"));
static NON_WORD_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("category pattern is valid"));

/// Folder name for a state: anything but ASCII letters and whitespace becomes a space.
pub fn sanitize_state(name: &str) -> String {
    NON_STATE_CHARS.replace_all(name, " ").trim_end().to_string()
}

/// Folder name for a vehicle category: runs of non-word characters collapse to one space.
pub fn sanitize_category(name: &str) -> String {
    NON_WORD_RUNS.replace_all(name, " ").trim_end().to_string()
}

/// Parsed form of an RTO office label such as `"Agra - UP80( 01-JAN-2004 )"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OfficeKey {
    pub name: String,
    pub code: String,
}

impl OfficeKey {
    pub fn parse(label: &str) -> Option<Self> {
        let captures = OFFICE_LABEL.captures(label)?;
        let name = captures.get(1)?.as_str().trim().to_string();
        let code = captures.get(2)?.as_str().trim().to_string();
        if name.is_empty() {
            return None;
        }
        Some(Self { name, code })
    }

    /// `<name>_<code>` with path separators removed.
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.name, self.code)
            .replace(['/', '\\'], "")
            .trim()
            .to_string()
    }
}

impl FromStr for OfficeKey {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OfficeKey::parse(value).ok_or_else(|| HarvestError::UnresolvableLabel(value.to_string()))
    }
}

/// One downloadable report: level, state, optional child (category or office label) and month.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct UnitOfWork {
    pub level: ReportLevel,
    pub state: String,
    pub child: Option<String>,
    pub period: Period,
}

impl UnitOfWork {
    pub fn oem(state: &str, category: &str, period: Period) -> Self {
        Self {
            level: ReportLevel::Oem,
            state: state.to_string(),
            child: Some(category.to_string()),
            period,
        }
    }

    pub fn state(state: &str, period: Period) -> Self {
        Self {
            level: ReportLevel::State,
            state: state.to_string(),
            child: None,
            period,
        }
    }

    pub fn rto(state: &str, office_label: &str, period: Period) -> Self {
        Self {
            level: ReportLevel::Rto,
            state: state.to_string(),
            child: Some(office_label.to_string()),
            period,
        }
    }

    pub fn scope_keys(&self) -> Vec<String> {
        let mut keys = vec![self.state.clone()];
        if let Some(child) = &self.child {
            keys.push(child.clone());
        }
        keys.push(self.period.year.to_string());
        keys.push(self.period.month.to_string());
        keys
    }

    pub fn office(&self) -> Option<OfficeKey> {
        match self.level {
            ReportLevel::Rto => self.child.as_deref().and_then(OfficeKey::parse),
            _ => None,
        }
    }
}

impl fmt::Display for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.scope_keys().join(" / "))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn month_accepts_labels_and_numbers() {
        assert_eq!("jan".parse::<Month>().unwrap(), Month::Jan);
        assert_eq!("DEC".parse::<Month>().unwrap(), Month::Dec);
        assert_eq!("7".parse::<Month>().unwrap(), Month::Jul);
        assert_matches!("13".parse::<Month>(), Err(HarvestError::InvalidMonth(_)));
        assert_matches!("JANUARY".parse::<Month>(), Err(HarvestError::InvalidMonth(_)));
    }

    #[test]
    fn previous_month_wraps_year() {
        let jan = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let period = Period::previous_month(jan).unwrap();
        assert_eq!(period.year.value(), 2024);
        assert_eq!(period.month, Month::Dec);

        let jul = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(Period::previous_month(jul).unwrap().month, Month::Jun);
    }

    #[test]
    fn state_sanitizer_keeps_letters_and_spaces() {
        assert_eq!(sanitize_state("Andaman & Nicobar Island"), "Andaman   Nicobar Island");
        assert_eq!(sanitize_state("Delhi(1)"), "Delhi");
    }

    #[test]
    fn category_sanitizer_collapses_symbols() {
        assert_eq!(
            sanitize_category("MOTOR CAR/JEEP/TAXI"),
            "MOTOR CAR JEEP TAXI"
        );
        assert_eq!(sanitize_category("E-RICKSHAW(P)"), "E RICKSHAW P");
    }

    #[test]
    fn office_label_parses_name_and_code() {
        let key = OfficeKey::parse("Agra - UP80( 01-JAN-2004 )").unwrap();
        assert_eq!(key.name, "Agra");
        assert_eq!(key.code, "UP80");
        assert_eq!(key.folder_name(), "Agra_UP80");
    }

    #[test]
    fn office_label_strips_separators() {
        let key = OfficeKey::parse("DTO Kamrup/Guwahati - AS1(01-APR-2010)").unwrap();
        assert_eq!(key.folder_name(), "DTO KamrupGuwahati_AS1");
    }

    #[test]
    fn malformed_office_label_is_rejected() {
        assert!(OfficeKey::parse("All Vahan4 Running Office").is_none());
        assert!(OfficeKey::parse("Agra UP80(x)").is_none());
        assert_matches!(
            "Agra - up80(x)".parse::<OfficeKey>(),
            Err(HarvestError::UnresolvableLabel(_))
        );
    }

    #[test]
    fn year_bounds() {
        assert!("2024".parse::<Year>().is_ok());
        assert_matches!("1800".parse::<Year>(), Err(HarvestError::InvalidYear(_)));
        assert_matches!("twenty".parse::<Year>(), Err(HarvestError::InvalidYear(_)));
    }

    #[test]
    fn period_grid_is_year_major() {
        let years = [Year::new(2023).unwrap(), Year::new(2024).unwrap()];
        let grid = Period::grid(&years, &[Month::Jan, Month::Feb]);
        assert_eq!(grid.len(), 4);
        assert_eq!(grid[1], Period::new(years[0], Month::Feb));
        assert_eq!(grid[2], Period::new(years[1], Month::Jan));
    }
}
