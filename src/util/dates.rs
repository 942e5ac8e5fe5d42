use time::{Date, Duration, OffsetDateTime, format_description::FormatItem, macros::format_description};

pub const DEFAULT_DATE_RANGE_DAYS: i64 = 7;

const ISO_DATE: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Inclusive `(start, end)` pair, formatted `YYYY-MM-DD`, covering `days`
/// before `end`.
pub fn date_range_ending(end: Date, days: i64) -> (String, String) {
    let start = end.checked_sub(Duration::days(days)).unwrap_or(Date::MIN);
    (iso_date(start), iso_date(end))
}

/// The default dashboard range: the last week up to today (UTC).
pub fn default_date_range() -> (String, String) {
    date_range_ending(OffsetDateTime::now_utc().date(), DEFAULT_DATE_RANGE_DAYS)
}

pub fn iso_date(date: Date) -> String {
    date.format(ISO_DATE)
        .expect("formatting a calendar date should succeed")
}

pub fn parse_iso_date(value: &str) -> Result<Date, time::error::Parse> {
    Date::parse(value.trim(), ISO_DATE)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn week_range_crosses_month_boundary() {
        let (start, end) = date_range_ending(date!(2024 - 03 - 03), 7);
        assert_eq!(start, "2024-02-25");
        assert_eq!(end, "2024-03-03");
    }

    #[test]
    fn parses_what_it_formats() {
        let date = parse_iso_date("2024-02-29").expect("leap day");
        assert_eq!(iso_date(date), "2024-02-29");
        assert!(parse_iso_date("2024-02-30").is_err());
        assert!(parse_iso_date("02/03/2024").is_err());
    }

    #[test]
    fn zero_days_is_a_single_day() {
        let (start, end) = date_range_ending(date!(2024 - 01 - 01), 0);
        assert_eq!(start, end);
    }
}
