use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

/// Day-first orderings, as printed on most lab reports.
const DATE_FORMATS: [&str; 14] = [
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%Y",
    "%d-%B-%Y",
    "%d %b, %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%Y/%m/%d",
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
];

const SHORT_YEAR_FORMATS: [&str; 5] = ["%d/%m/%y", "%d-%m-%y", "%d.%m.%y", "%d %b %y", "%d-%b-%y"];

const MIN_PLAUSIBLE_YEAR: i32 = 1900;

type DateStrategy = fn(&str) -> Option<NaiveDate>;

/// Tried in order; the first strategy producing a date wins.
const DATE_STRATEGIES: [DateStrategy; 2] = [parse_direct, parse_with_slashes_as_spaces];

pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(trimmed))
}

/// ISO rendering when the date parses, the original text otherwise.
pub fn normalize_report_date(raw: &str) -> String {
    match parse_report_date(raw) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.trim().to_string(),
    }
}

fn parse_direct(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .find(is_plausible)
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .filter_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
                .map(|value| value.date())
                .find(is_plausible)
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|value| value.date_naive())
                .filter(is_plausible)
        })
        .or_else(|| {
            SHORT_YEAR_FORMATS
                .iter()
                .filter_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .find(is_plausible)
        })
}

/// `01/Jun/2022` -> `01 Jun 2022`.
fn parse_with_slashes_as_spaces(text: &str) -> Option<NaiveDate> {
    if !text.contains('/') {
        return None;
    }
    parse_direct(&text.replace('/', " "))
}

fn is_plausible(date: &NaiveDate) -> bool {
    date.year() >= MIN_PLAUSIBLE_YEAR
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn parse_report_date_reads_day_first_numeric_forms() {
        assert_eq!(parse_report_date("01/06/2022"), Some(ymd(2022, 6, 1)));
        assert_eq!(parse_report_date("15-03-2021"), Some(ymd(2021, 3, 15)));
        assert_eq!(parse_report_date("2023-11-04"), Some(ymd(2023, 11, 4)));
    }

    #[test]
    fn parse_report_date_falls_back_to_slash_replacement_for_month_names() {
        assert_eq!(parse_report_date("01/Jun/2022"), Some(ymd(2022, 6, 1)));
        assert_eq!(parse_report_date("7/SEP/2020"), Some(ymd(2020, 9, 7)));
    }

    #[test]
    fn parse_report_date_handles_two_digit_years_and_timestamps() {
        assert_eq!(parse_report_date("01/06/22"), Some(ymd(2022, 6, 1)));
        assert_eq!(parse_report_date("2022-06-01T08:30:00"), Some(ymd(2022, 6, 1)));
        assert_eq!(parse_report_date("2022-06-01T08:30:00Z"), Some(ymd(2022, 6, 1)));
    }

    #[test]
    fn parse_report_date_returns_none_for_labels() {
        assert_eq!(parse_report_date("last visit"), None);
        assert_eq!(parse_report_date("   "), None);
    }

    #[test]
    fn normalize_report_date_is_stable() {
        let once = normalize_report_date("01/Jun/2022");
        assert_eq!(once, "2022-06-01");
        assert_eq!(normalize_report_date(&once), once);
        assert_eq!(normalize_report_date(" sometime "), "sometime");
    }
}
