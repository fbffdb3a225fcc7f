use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// Days after the due date before a contract may be re-checked
pub const D3_OFFSET_DAYS: i64 = 3;

/// Due days from here on get the previous-month correction
pub const END_OF_MONTH_DUE_DAY: u32 = 28;

/// The D+3 window of the billing cycle a reference date falls in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EligibilityWindow {
    pub due_date: NaiveDate,
    pub eligibility_date: NaiveDate,
    pub eligible: bool,
}

impl EligibilityWindow {
    /// Window used when a contract has no due day: never eligible
    pub fn closed(reference: NaiveDate) -> Self {
        Self {
            due_date: reference,
            eligibility_date: reference,
            eligible: false,
        }
    }

    /// Human readable reason, shown by the CLI
    pub fn describe(&self, reference: NaiveDate) -> String {
        if self.eligible {
            format!(
                "Eligible since {} (due {})",
                self.eligibility_date.format("%d/%m/%Y"),
                self.due_date.format("%d/%m/%Y")
            )
        } else {
            let wait = (self.eligibility_date - reference).num_days();
            if wait > 0 {
                format!(
                    "Not eligible yet: D+3 falls on {} ({} more days)",
                    self.eligibility_date.format("%d/%m/%Y"),
                    wait
                )
            } else {
                format!(
                    "Not eligible: D+3 date {} lies outside {}",
                    self.eligibility_date.format("%d/%m/%Y"),
                    reference.format("%m/%Y")
                )
            }
        }
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Due date in the given month, clamped to the month's last day
pub fn clamped_due_date(year: i32, month: u32, due_day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, due_day.min(days_in_month(year, month)))
}

fn previous_month(reference: NaiveDate) -> (i32, u32) {
    if reference.month() == 1 {
        (reference.year() - 1, 12)
    } else {
        (reference.year(), reference.month() - 1)
    }
}

/// D+3 window for a due day (1..=31) as seen on `reference`.
///
/// Returns `None` for a due day outside 1..=31.
///
/// For due days of 28 and later the previous month's window wins when its
/// D+3 date lands inside the reference month. When this month's D+3 date
/// spills into the next month, eligibility falls back to counting the days
/// elapsed since this month's due date.
pub fn eligibility_window(due_day: u32, reference: NaiveDate) -> Option<EligibilityWindow> {
    if !(1..=31).contains(&due_day) {
        return None;
    }

    let due_this_month = clamped_due_date(reference.year(), reference.month(), due_day)?;
    let d3_this_month = due_this_month + Duration::days(D3_OFFSET_DAYS);

    if due_day >= END_OF_MONTH_DUE_DAY {
        let (year, month) = previous_month(reference);
        let due_previous = clamped_due_date(year, month, due_day)?;
        let d3_previous = due_previous + Duration::days(D3_OFFSET_DAYS);

        if d3_previous.month() == reference.month() {
            return Some(EligibilityWindow {
                due_date: due_previous,
                eligibility_date: d3_previous,
                eligible: reference >= d3_previous,
            });
        }
    }

    let eligible = if d3_this_month.month() != reference.month() {
        (reference - due_this_month).num_days() >= D3_OFFSET_DAYS
    } else {
        reference >= d3_this_month
    };

    Some(EligibilityWindow {
        due_date: due_this_month,
        eligibility_date: d3_this_month,
        eligible,
    })
}

/// Window for a contract whose due day may be unknown or invalid
pub fn contract_window(due_day: Option<u32>, reference: NaiveDate) -> EligibilityWindow {
    due_day
        .and_then(|day| eligibility_window(day, reference))
        .unwrap_or_else(|| EligibilityWindow::closed(reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn d3_table() {
        // (due_day, reference, expected D+3 date, expected eligible)
        let cases = [
            // 30-day due day around the December turn
            (30, date(2025, 12, 2), date(2025, 12, 3), false),
            (30, date(2025, 12, 3), date(2025, 12, 3), true),
            // Plain mid-month due days
            (10, date(2025, 1, 12), date(2025, 1, 13), false),
            (10, date(2025, 1, 13), date(2025, 1, 13), true),
            (1, date(2025, 3, 3), date(2025, 3, 4), false),
            (1, date(2025, 3, 4), date(2025, 3, 4), true),
            (25, date(2025, 2, 28), date(2025, 2, 28), true),
            // D+3 spilling into March: counted from February's due date
            (27, date(2025, 2, 28), date(2025, 3, 2), false),
            (26, date(2025, 2, 28), date(2025, 3, 1), false),
            // Day 31 in a 30-day month: March 31 + 3 lands in April and wins
            (31, date(2025, 4, 2), date(2025, 4, 3), false),
            (31, date(2025, 4, 15), date(2025, 4, 3), true),
            // Day 31 after a non-leap February (clamped to the 28th)
            (31, date(2025, 3, 2), date(2025, 3, 3), false),
            (31, date(2025, 3, 3), date(2025, 3, 3), true),
            // Leap February clamps to the 29th
            (29, date(2024, 3, 2), date(2024, 3, 3), false),
            (29, date(2024, 3, 3), date(2024, 3, 3), true),
            (31, date(2024, 3, 2), date(2024, 3, 3), false),
            (29, date(2025, 3, 2), date(2025, 3, 3), false),
            (29, date(2025, 3, 3), date(2025, 3, 3), true),
            // Reference inside February
            (30, date(2025, 2, 1), date(2025, 2, 2), false),
            (30, date(2025, 2, 10), date(2025, 2, 2), true),
            (31, date(2024, 2, 29), date(2024, 2, 3), true),
            // First days of a new month, across the year boundary
            (31, date(2025, 1, 2), date(2025, 1, 3), false),
            (29, date(2025, 1, 1), date(2025, 1, 1), true),
            (29, date(2025, 1, 31), date(2025, 1, 1), true),
            // Day 28 in a 31-day month: previous window lands on the 1st
            (28, date(2025, 5, 31), date(2025, 5, 1), true),
            (28, date(2025, 3, 5), date(2025, 3, 3), true),
        ];

        for (due_day, reference, d3, eligible) in cases {
            let window = eligibility_window(due_day, reference).unwrap();
            assert_eq!(
                (window.eligibility_date, window.eligible),
                (d3, eligible),
                "due_day={} reference={}",
                due_day,
                reference
            );
        }
    }

    #[test]
    fn day_28_after_a_31_day_month_never_opens_within_the_month() {
        // May 28 + 3 = May 31 stays in May, so June falls through to June's
        // own window whose D+3 is July 1st.
        for day in [1, 15, 28, 30] {
            let window = eligibility_window(28, date(2025, 6, day)).unwrap();
            assert_eq!(window.eligibility_date, date(2025, 7, 1));
            assert!(!window.eligible, "June {} should not be eligible", day);
        }
        let july = eligibility_window(28, date(2025, 7, 1)).unwrap();
        assert_eq!(july.due_date, date(2025, 6, 28));
        assert!(july.eligible);
    }

    #[test]
    fn every_due_day_yields_a_window_for_a_whole_year() {
        let mut reference = date(2024, 1, 1);
        while reference <= date(2024, 12, 31) {
            for due_day in 1..=31 {
                let window = eligibility_window(due_day, reference).unwrap();
                assert_eq!(
                    (window.eligibility_date - window.due_date).num_days(),
                    D3_OFFSET_DAYS
                );
                if window.eligible {
                    assert!(window.eligibility_date <= reference);
                }
            }
            reference = reference.succ_opt().unwrap();
        }
    }

    #[test]
    fn clamps_to_month_end() {
        assert_eq!(clamped_due_date(2025, 2, 31), Some(date(2025, 2, 28)));
        assert_eq!(clamped_due_date(2024, 2, 30), Some(date(2024, 2, 29)));
        assert_eq!(clamped_due_date(2025, 11, 31), Some(date(2025, 11, 30)));
        assert_eq!(clamped_due_date(2025, 12, 31), Some(date(2025, 12, 31)));
    }

    #[test]
    fn invalid_or_missing_due_day_is_never_eligible() {
        assert_eq!(eligibility_window(0, date(2025, 5, 10)), None);
        assert_eq!(eligibility_window(32, date(2025, 5, 10)), None);

        let window = contract_window(None, date(2025, 5, 10));
        assert_eq!(window.eligibility_date, date(2025, 5, 10));
        assert!(!window.eligible);
    }
}
