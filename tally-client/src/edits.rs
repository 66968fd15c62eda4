//! Client-side mirror of the per-day edit aggregates.
//!
//! Day buckets are keyed by day-of-month (1–31). Walking backwards across a
//! month boundary therefore lands in buckets shared with the previous month's
//! matching day numbers; the rolling five-day view inherits that quirk from
//! the stored aggregate.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, Utc};

use tally_core::{EditDocument, ProjectName};

/// All projects' edit aggregates, as fetched in one bulk read.
pub type EditLog = BTreeMap<ProjectName, EditDocument>;

/// Day-of-month numbers for `today` back through four days ago, newest first.
pub fn last_five_day_numbers(today: DateTime<Utc>) -> [u32; 5] {
    let date = today.date_naive();
    let mut days = [0u32; 5];
    for (i, slot) in days.iter_mut().enumerate() {
        *slot = date
            .checked_sub_days(Days::new(i as u64))
            .map(|d| d.day())
            .unwrap_or_default();
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn mid_month_days_count_straight_down() {
        let today = Utc.with_ymd_and_hms(2026, 8, 17, 12, 0, 0).unwrap();
        assert_eq!(last_five_day_numbers(today), [17, 16, 15, 14, 13]);
    }

    #[test]
    fn month_boundary_wraps_day_numbers() {
        let today = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap();
        // February 2026 has 28 days.
        assert_eq!(last_five_day_numbers(today), [2, 1, 28, 27, 26]);
    }

    #[test]
    fn first_of_month_reaches_into_previous_month() {
        let today = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        assert_eq!(last_five_day_numbers(today), [1, 31, 30, 29, 28]);
    }
}
