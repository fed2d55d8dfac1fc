use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

pub const DEFAULT_APPOINTMENT_TIME_ZONE: &str = "Europe/Amsterdam";

pub fn normalize_time_zone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok().map(|tz| tz.name().to_string())
}

pub fn parse_time_zone_or_default(value: &str) -> Tz {
    normalize_time_zone(value)
        .and_then(|normalized| normalized.parse::<Tz>().ok())
        .unwrap_or(chrono_tz::Europe::Amsterdam)
}

/// The instant at which `local_date` begins in `time_zone`.
///
/// Falls back to UTC midnight when the zone skips local midnight entirely.
pub fn local_date_start_utc(local_date: NaiveDate, time_zone: &str) -> DateTime<Utc> {
    let midnight = local_date.and_time(chrono::NaiveTime::MIN);
    let tz = parse_time_zone_or_default(time_zone);

    resolve_local_datetime(&tz, midnight)
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

fn resolve_local_datetime(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(value) => Some(value),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::{local_date_start_utc, normalize_time_zone, parse_time_zone_or_default};

    #[test]
    fn normalize_time_zone_accepts_valid_iana_name() {
        assert_eq!(
            normalize_time_zone("Europe/Amsterdam"),
            Some("Europe/Amsterdam".to_string())
        );
    }

    #[test]
    fn normalize_time_zone_rejects_invalid_values() {
        assert_eq!(normalize_time_zone(""), None);
        assert_eq!(normalize_time_zone("Mars/Olympus"), None);
    }

    #[test]
    fn invalid_zone_falls_back_to_amsterdam() {
        assert_eq!(
            parse_time_zone_or_default("not-a-time-zone"),
            chrono_tz::Europe::Amsterdam
        );
    }

    #[test]
    fn local_midnight_converts_to_utc_in_winter_and_summer() {
        let winter = NaiveDate::from_ymd_opt(2026, 1, 15).expect("valid date");
        let start = local_date_start_utc(winter, "Europe/Amsterdam");
        assert_eq!(start.date_naive().to_string(), "2026-01-14");
        assert_eq!(start.hour(), 23);

        let summer = NaiveDate::from_ymd_opt(2026, 7, 15).expect("valid date");
        let start = local_date_start_utc(summer, "Europe/Amsterdam");
        assert_eq!(start.hour(), 22);
    }

    #[test]
    fn utc_zone_keeps_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date");
        let start = local_date_start_utc(date, "UTC");
        assert_eq!(start.date_naive(), date);
        assert_eq!(start.hour(), 0);
    }
}
