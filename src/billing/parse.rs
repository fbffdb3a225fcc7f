//! Parsing of the cell text found in the portal's invoice table.

use chrono::NaiveDate;

fn clean_cell(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}

/// `DD/MM/YYYY`; blank or malformed cells are `None`
pub fn parse_br_date(raw: &str) -> Option<NaiveDate> {
    let cell = clean_cell(raw);
    if cell.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(&cell, "%d/%m/%Y").ok()
}

/// Money in Brazilian notation (`R$ 1.234,56`). Unparsable text yields 0.0.
pub fn parse_br_amount(raw: &str) -> f64 {
    let kept: String = clean_cell(raw)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    let normalized = if kept.contains(',') {
        kept.replace('.', "").replace(',', ".")
    } else {
        kept
    };

    normalized.parse().unwrap_or(0.0)
}

/// Days-late column; anything that is not a plain number counts as zero
pub fn parse_delinquency_days(raw: &str) -> i64 {
    let cell = clean_cell(raw);
    if !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit()) {
        cell.parse().unwrap_or(0)
    } else {
        0
    }
}

/// `MM/YYYY` into (month, year). Extra segments after the year are ignored.
pub fn parse_reference_period(raw: &str) -> Option<(u32, i32)> {
    let mut parts = raw.split('/');
    let month = parts.next()?.trim().parse().ok()?;
    let year = parts.next()?.trim().parse().ok()?;
    Some((month, year))
}

/// First day of the month named by a `MM/YYYY` label
pub fn reference_month_start(raw: &str) -> Option<NaiveDate> {
    let (month, year) = parse_reference_period(raw)?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates() {
        assert_eq!(
            parse_br_date("10/01/2025"),
            NaiveDate::from_ymd_opt(2025, 1, 10)
        );
        assert_eq!(
            parse_br_date("\u{a0}05/02/2024\u{a0}"),
            NaiveDate::from_ymd_opt(2024, 2, 5)
        );
        assert_eq!(parse_br_date("   "), None);
        assert_eq!(parse_br_date("31/02/2025"), None);
        assert_eq!(parse_br_date("2025-01-10"), None);
    }

    #[test]
    fn amounts() {
        assert_eq!(parse_br_amount("R$ 1.234,56"), 1234.56);
        assert_eq!(parse_br_amount("R$ 389,90"), 389.9);
        assert_eq!(parse_br_amount("512.00"), 512.0);
        assert_eq!(parse_br_amount("R$ -"), 0.0);
    }

    #[test]
    fn delinquency_days() {
        assert_eq!(parse_delinquency_days(" 17 "), 17);
        assert_eq!(parse_delinquency_days(""), 0);
        assert_eq!(parse_delinquency_days("-3"), 0);
    }

    #[test]
    fn reference_periods() {
        assert_eq!(parse_reference_period("01/2025"), Some((1, 2025)));
        assert_eq!(parse_reference_period(" 12 / 2024"), Some((12, 2024)));
        assert_eq!(parse_reference_period("2025"), None);
        assert_eq!(parse_reference_period("jan/2025"), None);
        assert_eq!(
            reference_month_start("03/2025"),
            NaiveDate::from_ymd_opt(2025, 3, 1)
        );
        assert_eq!(reference_month_start("13/2025"), None);
    }
}
