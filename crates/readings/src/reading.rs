//! Date-scoped readings and their cache keys.
//!
//! A reading is keyed by `(owner, kind, period)`. Staleness is purely a key
//! mismatch: an entry never expires, it simply stops being asked for once the
//! period moves on.

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use celestia_core::{DomainError, OwnerId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingKind {
    Daily,
    Tomorrow,
    Monthly,
}

impl ReadingKind {
    pub const ALL: [ReadingKind; 3] = [ReadingKind::Daily, ReadingKind::Tomorrow, ReadingKind::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingKind::Daily => "daily",
            ReadingKind::Tomorrow => "tomorrow",
            ReadingKind::Monthly => "monthly",
        }
    }

    /// Period this kind refers to when asked on `today`.
    pub fn period_for(&self, today: NaiveDate) -> Result<PeriodKey, DomainError> {
        match self {
            ReadingKind::Daily => Ok(PeriodKey::Day(today)),
            ReadingKind::Tomorrow => today
                .checked_add_days(Days::new(1))
                .map(PeriodKey::Day)
                .ok_or_else(|| DomainError::validation("date out of range")),
            ReadingKind::Monthly => Ok(PeriodKey::Month {
                year: today.year(),
                month: today.month(),
            }),
        }
    }
}

impl core::fmt::Display for ReadingKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ReadingKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(ReadingKind::Daily),
            "tomorrow" => Ok(ReadingKind::Tomorrow),
            "monthly" | "month" => Ok(ReadingKind::Monthly),
            other => Err(DomainError::validation(format!("unknown reading kind: {other}"))),
        }
    }
}

/// Calendar day (`YYYY-MM-DD`) or calendar month (`YYYY-MM`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeriodKey {
    Day(NaiveDate),
    Month { year: i32, month: u32 },
}

impl PeriodKey {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Ok(PeriodKey::Day(day));
        }
        let invalid = || DomainError::validation(format!("invalid period key: {raw:?}"));
        let (year, month) = raw.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(PeriodKey::Month { year, month })
    }
}

impl core::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PeriodKey::Day(day) => write!(f, "{}", day.format("%Y-%m-%d")),
            PeriodKey::Month { year, month } => write!(f, "{year:04}-{month:02}"),
        }
    }
}

impl TryFrom<String> for PeriodKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PeriodKey> for String {
    fn from(value: PeriodKey) -> Self {
        value.to_string()
    }
}

/// Optional numeric scores (0–100) attached to a reading.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingScores {
    pub emotion: Option<u8>,
    pub energy: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedReading {
    pub owner_id: OwnerId,
    pub kind: ReadingKind,
    pub period_key: PeriodKey,
    pub content: String,
    pub scores: ReadingScores,
    pub created_at: DateTime<Utc>,
}

impl CachedReading {
    /// Relabel a "tomorrow" reading as the "daily" reading for the same date.
    ///
    /// Content and scores are carried over unchanged.
    pub fn rolled_forward(&self, now: DateTime<Utc>) -> Result<CachedReading, DomainError> {
        if self.kind != ReadingKind::Tomorrow {
            return Err(DomainError::invariant(format!(
                "only tomorrow readings roll forward, got {}",
                self.kind
            )));
        }
        Ok(CachedReading {
            owner_id: self.owner_id.clone(),
            kind: ReadingKind::Daily,
            period_key: self.period_key,
            content: self.content.clone(),
            scores: self.scores,
            created_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_keys_per_kind() {
        let today = day(2024, 12, 31);
        assert_eq!(ReadingKind::Daily.period_for(today).unwrap().to_string(), "2024-12-31");
        assert_eq!(ReadingKind::Tomorrow.period_for(today).unwrap().to_string(), "2025-01-01");
        assert_eq!(ReadingKind::Monthly.period_for(today).unwrap().to_string(), "2024-12");
    }

    #[test]
    fn tomorrow_key_today_equals_daily_key_tomorrow() {
        let d = day(2024, 2, 28);
        let next = d.succ_opt().unwrap();
        assert_eq!(
            ReadingKind::Tomorrow.period_for(d).unwrap(),
            ReadingKind::Daily.period_for(next).unwrap()
        );
    }

    #[test]
    fn period_key_parsing() {
        assert_eq!(PeriodKey::parse("2024-03-09").unwrap(), PeriodKey::Day(day(2024, 3, 9)));
        assert_eq!(PeriodKey::parse("2024-03").unwrap(), PeriodKey::Month { year: 2024, month: 3 });
        for bad in ["2024-13", "2024-3", "24-03", "march", "2024-02-30"] {
            assert!(PeriodKey::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn roll_forward_relabels_without_changing_content() {
        let created = Utc.with_ymd_and_hms(2024, 3, 8, 10, 0, 0).unwrap();
        let tomorrow = CachedReading {
            owner_id: OwnerId::parse("o@example.com").unwrap(),
            kind: ReadingKind::Tomorrow,
            period_key: PeriodKey::Day(day(2024, 3, 9)),
            content: "Expect a letter.".into(),
            scores: ReadingScores { emotion: Some(70), energy: Some(40) },
            created_at: created,
        };

        let now = created + chrono::Duration::days(1);
        let daily = tomorrow.rolled_forward(now).unwrap();
        assert_eq!(daily.kind, ReadingKind::Daily);
        assert_eq!(daily.period_key, tomorrow.period_key);
        assert_eq!(daily.content, tomorrow.content);
        assert_eq!(daily.scores, tomorrow.scores);
        assert!(daily.rolled_forward(now).is_err());
    }

    #[test]
    fn kind_parses_month_alias() {
        assert_eq!("month".parse::<ReadingKind>().unwrap(), ReadingKind::Monthly);
        assert!("weekly".parse::<ReadingKind>().is_err());
    }
}
