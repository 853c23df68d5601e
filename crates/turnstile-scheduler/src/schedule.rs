use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::warn;

use turnstile_core::Schedule;

/// Compute the next UTC run time for `schedule`, strictly after `from`.
///
/// Always derived fresh from `from` — never from a previous target — so a
/// firing that ran late does not drift the series or trigger catch-up runs.
/// Returns `None` for schedule kinds that cannot produce a next run
/// (currently `Cron`, whose parsing is out of scope).
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Interval { every_secs } => Some(from + Duration::seconds(*every_secs as i64)),

        Schedule::Daily { hour, minute } => {
            let today = at_time(from, *hour, *minute)?;
            if today > from {
                Some(today)
            } else {
                Some(today + Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            // ISO weekday numbering, 0 = Monday … 6 = Sunday, matching
            // chrono's num_days_from_monday.
            let target = i64::from((*day).min(6));
            let current = i64::from(from.weekday().num_days_from_monday());
            let candidate_day = from + Duration::days((target - current).rem_euclid(7));
            let candidate = at_time(candidate_day, *hour, *minute)?;
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(7))
            }
        }

        Schedule::Cron { expression } => {
            warn!(%expression, "cron schedules are not interpreted; no next run");
            None
        }
    }
}

/// Reject schedules whose fields can never name a real instant.
///
/// Cron expressions pass: they are accepted in config even though no run
/// times are derived from them yet.
pub fn validate(schedule: &Schedule) -> std::result::Result<(), String> {
    match schedule {
        Schedule::Interval { every_secs: 0 } => Err("interval must be positive".to_string()),
        Schedule::Interval { .. } => Ok(()),
        Schedule::Daily { hour, minute } | Schedule::Weekly { hour, minute, .. }
            if *hour > 23 || *minute > 59 =>
        {
            Err(format!("time {hour:02}:{minute:02} is out of range"))
        }
        Schedule::Weekly { day, .. } if *day > 6 => {
            Err(format!("weekday {day} is out of range (0 = Monday … 6 = Sunday)"))
        }
        Schedule::Daily { .. } | Schedule::Weekly { .. } | Schedule::Cron { .. } => Ok(()),
    }
}

/// The given day at HH:MM:00 UTC. `None` only for out-of-range times.
fn at_time(day: DateTime<Utc>, hour: u8, minute: u8) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(
        day.year(),
        day.month(),
        day.day(),
        u32::from(hour),
        u32::from(minute),
        0,
    )
    .single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn interval_adds_seconds_to_now() {
        let from = utc(2026, 8, 23, 12, 0, 0);
        let next = compute_next_run(&Schedule::Interval { every_secs: 90 }, from).unwrap();
        assert_eq!(next, from + Duration::seconds(90));
    }

    #[test]
    fn daily_same_day_when_time_still_ahead() {
        let from = utc(2026, 8, 23, 1, 0, 0);
        let next =
            compute_next_run(&Schedule::Daily { hour: 2, minute: 30 }, from).unwrap();
        assert_eq!(next, utc(2026, 8, 23, 2, 30, 0));
    }

    #[test]
    fn daily_rolls_to_tomorrow_when_time_passed() {
        let from = utc(2026, 8, 23, 3, 0, 0);
        let next =
            compute_next_run(&Schedule::Daily { hour: 2, minute: 30 }, from).unwrap();
        assert_eq!(next, utc(2026, 8, 24, 2, 30, 0));
    }

    #[test]
    fn daily_at_exact_boundary_targets_tomorrow() {
        // "Strictly after": firing exactly at the scheduled minute must not
        // rearm for the same instant.
        let from = utc(2026, 8, 23, 2, 30, 0);
        let next =
            compute_next_run(&Schedule::Daily { hour: 2, minute: 30 }, from).unwrap();
        assert_eq!(next, utc(2026, 8, 24, 2, 30, 0));
    }

    #[test]
    fn weekly_targets_upcoming_weekday() {
        // 2026-08-23 is a Sunday (day 6). Next Wednesday (day 2) is the 26th.
        let from = utc(2026, 8, 23, 12, 0, 0);
        let next = compute_next_run(
            &Schedule::Weekly { day: 2, hour: 9, minute: 0 },
            from,
        )
        .unwrap();
        assert_eq!(next, utc(2026, 8, 26, 9, 0, 0));
    }

    #[test]
    fn weekly_same_day_rolls_a_week_when_time_passed() {
        // Sunday 12:00 asking for Sunday 09:00 → next Sunday.
        let from = utc(2026, 8, 23, 12, 0, 0);
        let next = compute_next_run(
            &Schedule::Weekly { day: 6, hour: 9, minute: 0 },
            from,
        )
        .unwrap();
        assert_eq!(next, utc(2026, 8, 30, 9, 0, 0));
    }

    #[test]
    fn validate_accepts_in_range_schedules() {
        assert!(validate(&Schedule::Interval { every_secs: 1 }).is_ok());
        assert!(validate(&Schedule::Daily { hour: 23, minute: 59 }).is_ok());
        assert!(validate(&Schedule::Weekly { day: 6, hour: 0, minute: 0 }).is_ok());
        assert!(validate(&Schedule::Cron {
            expression: "@hourly".to_string()
        })
        .is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_fields() {
        assert!(validate(&Schedule::Interval { every_secs: 0 }).is_err());
        assert!(validate(&Schedule::Daily { hour: 24, minute: 0 }).is_err());
        assert!(validate(&Schedule::Weekly { day: 7, hour: 9, minute: 0 }).is_err());
        assert!(validate(&Schedule::Weekly { day: 1, hour: 9, minute: 60 }).is_err());
    }

    #[test]
    fn cron_yields_no_next_run() {
        let from = utc(2026, 8, 23, 12, 0, 0);
        let schedule = Schedule::Cron {
            expression: "*/5 * * * *".to_string(),
        };
        assert!(compute_next_run(&schedule, from).is_none());
    }
}
