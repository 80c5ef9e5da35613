use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::record::DrawEntry;
use crate::{calendar_date, TwoDigit};

static ISO_DATE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").ok());

static DAY_MONTH_YEAR: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/.\-](\d{1,2})[/.\-](\d{2}|\d{4})$").ok());

static TIME_OF_DAY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,2}):(\d{2})\s*(AM|PM)?$").ok());

static LABELED_DECIMAL: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z][A-Za-z ]*:?\s*)?(\d{1,3}(?:,\d{3})+\.\d+|\d+\.\d+)$").ok()
});

static DECIMAL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{1,3}(?:,\d{3})+\.\d+|\d+\.\d+)$").ok());

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ImportIssueCode {
    UnparseableDate,
    ResultWithoutDate,
    UnrecognizedLine,
    IncompleteDraft,
    DanglingMarketLabel,
}

impl ImportIssueCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnparseableDate => "unparseable_date",
            Self::ResultWithoutDate => "result_without_date",
            Self::UnrecognizedLine => "unrecognized_line",
            Self::IncompleteDraft => "incomplete_draft",
            Self::DanglingMarketLabel => "dangling_market_label",
        }
    }
}

/// A rejected line, or a date whose draft never completed.
///
/// `line` is the 1-based line number in the pasted text; for incomplete
/// drafts it points at the date line that opened the draft.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ImportIssue {
    pub line: usize,
    pub text: String,
    pub code: ImportIssueCode,
}

impl Display for ImportIssue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line, self.code.as_str(), self.text)
    }
}

/// Outcome of [`crate::RecordStore::bulk_import`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<ImportIssue>,
}

impl ImportReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

/// Complete drafts in ascending date order, plus everything that was rejected.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ParsedImport {
    pub entries: Vec<DrawEntry>,
    pub issues: Vec<ImportIssue>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Session {
    Morning,
    Evening,
}

#[derive(Debug, Default)]
struct Draft {
    opened_at: usize,
    source: String,
    am: Option<TwoDigit>,
    pm: Option<TwoDigit>,
    market: Option<(String, String)>,
}

enum DateLine {
    Valid(Date),
    Impossible,
    NotADate,
}

/// Scans pasted report text into draw entries.
///
/// Never fails: anything that cannot be placed becomes an [`ImportIssue`].
#[must_use]
pub fn parse_import(text: &str) -> ParsedImport {
    let cleaned: String = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(char::is_ascii)
        .collect();

    let lines: Vec<(usize, &str)> = cleaned
        .split('\n')
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();

    let mut drafts: BTreeMap<Date, Draft> = BTreeMap::new();
    let mut issues = Vec::new();
    let mut current_date: Option<Date> = None;
    let mut last_session: Option<Session> = None;
    let mut pending_market: Option<(String, String)> = None;

    let mut cursor = 0;
    while cursor < lines.len() {
        let (line_no, line) = lines[cursor];
        cursor += 1;

        match classify_date(line) {
            DateLine::Valid(date) => {
                current_date = Some(date);
                drafts.entry(date).or_insert_with(|| Draft {
                    opened_at: line_no,
                    source: line.to_string(),
                    ..Draft::default()
                });
                last_session = None;
                pending_market = None;
                continue;
            }
            DateLine::Impossible => {
                current_date = None;
                last_session = None;
                pending_market = None;
                issues.push(issue(line_no, line, ImportIssueCode::UnparseableDate));
                continue;
            }
            DateLine::NotADate => {}
        }

        if let Some(session) = classify_time(line) {
            last_session = Some(session);
            continue;
        }

        if let Ok(value) = TwoDigit::parse(line) {
            let Some(draft) = current_date.and_then(|date| drafts.get_mut(&date)) else {
                issues.push(issue(line_no, line, ImportIssueCode::ResultWithoutDate));
                continue;
            };
            place_result(draft, value, last_session);
            if let Some(market) = pending_market.take() {
                draft.market = Some(market);
            }
            continue;
        }

        if let Some(index) = capture_decimal(&LABELED_DECIMAL, line) {
            let value = lines
                .get(cursor)
                .and_then(|(_, next)| capture_decimal(&DECIMAL, next));
            match value {
                Some(value) => {
                    cursor += 1;
                    pending_market = Some((index, value));
                }
                None => issues.push(issue(line_no, line, ImportIssueCode::DanglingMarketLabel)),
            }
            continue;
        }

        issues.push(issue(line_no, line, ImportIssueCode::UnrecognizedLine));
    }

    let mut entries = Vec::new();
    for (date, draft) in drafts {
        match (draft.am, draft.pm) {
            (Some(am), Some(pm)) => {
                let (index, value) = draft.market.unzip();
                entries.push(DrawEntry::new(date, am, pm).with_market(index, value));
            }
            _ => issues.push(issue(
                draft.opened_at,
                &draft.source,
                ImportIssueCode::IncompleteDraft,
            )),
        }
    }
    issues.sort_by_key(|issue| issue.line);

    tracing::debug!(
        lines = lines.len(),
        entries = entries.len(),
        issues = issues.len(),
        "parsed import text"
    );

    ParsedImport { entries, issues }
}

fn issue(line: usize, text: &str, code: ImportIssueCode) -> ImportIssue {
    ImportIssue {
        line,
        text: text.to_string(),
        code,
    }
}

fn place_result(draft: &mut Draft, value: TwoDigit, session: Option<Session>) {
    match session {
        Some(Session::Morning) => draft.am = Some(value),
        Some(Session::Evening) => draft.pm = Some(value),
        None if draft.am.is_none() => draft.am = Some(value),
        None => draft.pm = Some(value),
    }
}

fn classify_date(line: &str) -> DateLine {
    if let Some(captures) = ISO_DATE.as_ref().and_then(|re| re.captures(line)) {
        return resolve_date(&captures[1], &captures[2], &captures[3]);
    }
    if let Some(captures) = DAY_MONTH_YEAR.as_ref().and_then(|re| re.captures(line)) {
        return resolve_date(&captures[3], &captures[2], &captures[1]);
    }
    DateLine::NotADate
}

fn resolve_date(year: &str, month: &str, day: &str) -> DateLine {
    let year = if year.len() == 2 {
        format!("20{year}")
    } else {
        year.to_string()
    };
    let parsed = year.parse::<i32>().ok().zip(month.parse::<u8>().ok()).zip(day.parse::<u8>().ok());
    match parsed.and_then(|((year, month), day)| calendar_date(year, month, day)) {
        Some(date) => DateLine::Valid(date),
        None => DateLine::Impossible,
    }
}

/// Late-morning draws (hour 11 or 12) and the `00:00` marker fill the
/// morning slot; every other time fills the evening slot.
fn classify_time(line: &str) -> Option<Session> {
    let captures = TIME_OF_DAY.as_ref()?.captures(line)?;
    let hour: u8 = captures[1].parse().ok()?;
    let minute: u8 = captures[2].parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    if hour == 11 || hour == 12 || (hour == 0 && minute == 0) {
        Some(Session::Morning)
    } else {
        Some(Session::Evening)
    }
}

fn capture_decimal(pattern: &LazyLock<Option<Regex>>, line: &str) -> Option<String> {
    let captures = pattern.as_ref()?.captures(line)?;
    Some(captures[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, digit};

    fn codes(parsed: &ParsedImport) -> Vec<ImportIssueCode> {
        parsed.issues.iter().map(|issue| issue.code).collect()
    }

    #[test]
    fn time_tokens_route_results_to_sessions() {
        let parsed = parse_import("2026-01-23\n11:00 AM\n43\n04:30 PM\n91");
        assert!(parsed.issues.is_empty());
        assert_eq!(
            parsed.entries,
            vec![DrawEntry::new(date("2026-01-23"), digit("43"), digit("91"))]
        );
    }

    #[test]
    fn evening_first_still_lands_in_the_right_slots() {
        let parsed = parse_import("2026-01-23\n4:30 pm\n91\n12:01 PM\n43");
        assert_eq!(parsed.entries[0].am, digit("43"));
        assert_eq!(parsed.entries[0].pm, digit("91"));
    }

    #[test]
    fn midnight_marker_is_morning() {
        let parsed = parse_import("2026-01-23\n00:00\n43\n16:30\n91");
        assert_eq!(parsed.entries[0].am, digit("43"));
        assert_eq!(parsed.entries[0].pm, digit("91"));
    }

    #[test]
    fn results_without_time_fill_am_then_pm() {
        let parsed = parse_import("23/01/26\n43\n91");
        assert!(parsed.issues.is_empty());
        assert_eq!(parsed.entries[0].date, date("2026-01-23"));
        assert_eq!(parsed.entries[0].am, digit("43"));
        assert_eq!(parsed.entries[0].pm, digit("91"));
    }

    #[test]
    fn day_month_year_variants_are_accepted() {
        for raw in ["23/1/2026", "23.01.26", "23-01-2026"] {
            let parsed = parse_import(&format!("{raw}\n43\n91"));
            assert_eq!(parsed.entries.len(), 1, "{raw}");
            assert_eq!(parsed.entries[0].date, date("2026-01-23"), "{raw}");
        }
    }

    #[test]
    fn bare_result_without_date_is_rejected() {
        let parsed = parse_import("43");
        assert!(parsed.entries.is_empty());
        assert_eq!(codes(&parsed), vec![ImportIssueCode::ResultWithoutDate]);
    }

    #[test]
    fn impossible_date_clears_current_date() {
        let parsed = parse_import("2026-02-30\n43\n91");
        assert!(parsed.entries.is_empty());
        assert_eq!(
            codes(&parsed),
            vec![
                ImportIssueCode::UnparseableDate,
                ImportIssueCode::ResultWithoutDate,
                ImportIssueCode::ResultWithoutDate,
            ]
        );
    }

    #[test]
    fn incomplete_drafts_and_noise_are_reported_with_line_numbers() {
        let parsed = parse_import("2026-01-22\n42\n\nhello world\n2026-01-23\n43\n91");
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].date, date("2026-01-23"));

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[0].line, 1);
        assert_eq!(parsed.issues[0].code, ImportIssueCode::IncompleteDraft);
        assert_eq!(parsed.issues[1].line, 4);
        assert_eq!(parsed.issues[1].code, ImportIssueCode::UnrecognizedLine);
        assert_eq!(parsed.issues[1].text, "hello world");
    }

    #[test]
    fn market_pair_attaches_to_next_result() {
        let parsed = parse_import("2026-01-23\n11:00 AM\nSET 1,314.39\n50,901.86\n43\n4:30 PM\n91");
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        let entry = &parsed.entries[0];
        assert_eq!(entry.market_index.as_deref(), Some("1,314.39"));
        assert_eq!(entry.market_value.as_deref(), Some("50,901.86"));
    }

    #[test]
    fn market_label_without_value_is_dangling() {
        let parsed = parse_import("2026-01-23\nIndex: 1314.39\n43\n91");
        assert_eq!(parsed.entries.len(), 1);
        assert!(parsed.entries[0].market_index.is_none());
        assert_eq!(codes(&parsed), vec![ImportIssueCode::DanglingMarketLabel]);
    }

    #[test]
    fn date_line_discards_pending_market() {
        let parsed = parse_import("1314.39\n50901.86\n2026-01-23\n43\n91");
        assert!(parsed.issues.is_empty());
        assert!(parsed.entries[0].market_index.is_none());
    }

    #[test]
    fn non_ascii_and_crlf_are_normalized() {
        let parsed = parse_import("2026-01-23 \u{1000}\r\n11:00 AM\r43\r\n4:30 PM\r\n91 \u{2714}");
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        assert_eq!(parsed.entries.len(), 1);
    }

    #[test]
    fn entries_are_emitted_in_ascending_date_order() {
        let parsed = parse_import("2026-01-23\n43\n91\n2026-01-21\n71\n68\n2026-01-22\n42\n44");
        let dates: Vec<Date> = parsed.entries.iter().map(|entry| entry.date).collect();
        assert_eq!(
            dates,
            vec![date("2026-01-21"), date("2026-01-22"), date("2026-01-23")]
        );
    }

    #[test]
    fn issue_codes_serialize_snake_case() {
        let value = serde_json::to_value(ImportIssueCode::DanglingMarketLabel).ok();
        assert_eq!(value, Some(serde_json::json!("dangling_market_label")));
    }
}
