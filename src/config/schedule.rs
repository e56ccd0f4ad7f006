//! Schedule interval presets and logical-date arithmetic.

use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How often the pipeline is due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduleInterval {
    Once,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// Fixed period in seconds
    EverySeconds(u64),
}

impl ScheduleInterval {
    /// Start of the interval following `logical_date`, `None` for `@once`
    pub fn next_after(&self, logical_date: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Once => None,
            Self::Hourly => logical_date.checked_add_signed(ChronoDuration::hours(1)),
            Self::Daily => logical_date.checked_add_signed(ChronoDuration::days(1)),
            Self::Weekly => logical_date.checked_add_signed(ChronoDuration::weeks(1)),
            Self::Monthly => logical_date.checked_add_months(Months::new(1)),
            Self::EverySeconds(seconds) => i64::try_from(*seconds)
                .ok()
                .filter(|s| *s > 0)
                .and_then(|s| logical_date.checked_add_signed(ChronoDuration::seconds(s))),
        }
    }

    /// Logical dates of every interval that has fully elapsed by `now`.
    ///
    /// A run for logical date `d` is due once the interval starting at `d` has
    /// closed. With `catchup` disabled only the most recent due date is returned.
    pub fn due_logical_dates(
        &self,
        start_date: NaiveDate,
        now: DateTime<Utc>,
        catchup: bool,
    ) -> Vec<DateTime<Utc>> {
        let start = Utc.from_utc_datetime(&start_date.and_time(NaiveTime::MIN));
        let mut due = Vec::new();

        if *self == Self::Once {
            if start <= now {
                due.push(start);
            }
            return due;
        }

        let mut current = start;
        while let Some(next) = self.next_after(current) {
            if next > now {
                break;
            }
            due.push(current);
            current = next;
        }

        if !catchup {
            if let Some(latest) = due.pop() {
                return vec![latest];
            }
        }
        due
    }
}

impl fmt::Display for ScheduleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("@once"),
            Self::Hourly => f.write_str("@hourly"),
            Self::Daily => f.write_str("@daily"),
            Self::Weekly => f.write_str("@weekly"),
            Self::Monthly => f.write_str("@monthly"),
            Self::EverySeconds(seconds) => write!(f, "{seconds}"),
        }
    }
}

impl FromStr for ScheduleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "@once" => Ok(Self::Once),
            "@hourly" => Ok(Self::Hourly),
            "@daily" => Ok(Self::Daily),
            "@weekly" => Ok(Self::Weekly),
            "@monthly" => Ok(Self::Monthly),
            other => other
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .map(Self::EverySeconds)
                .ok_or_else(|| format!("Invalid schedule interval: {s}")),
        }
    }
}

impl TryFrom<String> for ScheduleInterval {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleInterval> for String {
    fn from(value: ScheduleInterval) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_presets() {
        assert_eq!("@daily".parse(), Ok(ScheduleInterval::Daily));
        assert_eq!("@monthly".parse(), Ok(ScheduleInterval::Monthly));
        assert_eq!("3600".parse(), Ok(ScheduleInterval::EverySeconds(3600)));
        assert!("0".parse::<ScheduleInterval>().is_err());
        assert!("@fortnightly".parse::<ScheduleInterval>().is_err());
    }

    #[test]
    fn test_next_after() {
        assert_eq!(
            ScheduleInterval::Daily.next_after(at(2019, 1, 12, 0)),
            Some(at(2019, 1, 13, 0))
        );
        assert_eq!(
            ScheduleInterval::Monthly.next_after(at(2019, 1, 31, 0)),
            Some(at(2019, 2, 28, 0))
        );
        assert_eq!(ScheduleInterval::Once.next_after(at(2019, 1, 12, 0)), None);
    }

    #[test]
    fn test_due_dates_without_catchup_returns_latest_only() {
        let start = NaiveDate::from_ymd_opt(2019, 1, 12).unwrap();
        let now = at(2019, 1, 15, 6);

        let all = ScheduleInterval::Daily.due_logical_dates(start, now, true);
        assert_eq!(
            all,
            vec![at(2019, 1, 12, 0), at(2019, 1, 13, 0), at(2019, 1, 14, 0)]
        );

        let latest = ScheduleInterval::Daily.due_logical_dates(start, now, false);
        assert_eq!(latest, vec![at(2019, 1, 14, 0)]);
    }

    #[test]
    fn test_nothing_due_before_first_interval_closes() {
        let start = NaiveDate::from_ymd_opt(2019, 1, 12).unwrap();
        let due = ScheduleInterval::Daily.due_logical_dates(start, at(2019, 1, 12, 23), false);
        assert!(due.is_empty());
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&ScheduleInterval::Hourly).unwrap();
        assert_eq!(json, "\"@hourly\"");
        let parsed: ScheduleInterval = serde_json::from_str("\"@weekly\"").unwrap();
        assert_eq!(parsed, ScheduleInterval::Weekly);
    }
}
