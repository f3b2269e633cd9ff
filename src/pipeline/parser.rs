use serde_json::{Map, Value};
use tracing::debug;

use crate::model::CandidateRecord;

const RECORD_KEYS: [&str; 2] = ["test_name", "value"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceStep {
    Outside,
    Opened,
    Inside,
    Closed,
}

/// Depth counter over `{`/`}` that ignores braces inside JSON string literals.
/// A raw newline always ends a string literal, so one unterminated quote cannot
/// swallow the rest of the input.
#[derive(Debug, Default, Clone)]
struct BraceState {
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BraceState {
    fn step(&mut self, ch: char) -> BraceStep {
        if self.depth == 0 {
            if ch == '{' {
                self.depth = 1;
                self.in_string = false;
                self.escaped = false;
                return BraceStep::Opened;
            }
            return BraceStep::Outside;
        }

        if ch == '\n' {
            self.in_string = false;
            self.escaped = false;
            return BraceStep::Inside;
        }

        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if ch == '\\' {
                self.escaped = true;
            } else if ch == '"' {
                self.in_string = false;
            }
            return BraceStep::Inside;
        }

        match ch {
            '"' => self.in_string = true,
            '{' => self.depth += 1,
            '}' => {
                self.depth -= 1;
                if self.depth == 0 {
                    return BraceStep::Closed;
                }
            }
            _ => {}
        }
        BraceStep::Inside
    }

    fn is_open(&self) -> bool {
        self.depth > 0
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Each restart rescans the rest of the text, so unmatched braces are only
/// retried this many times.
const MAX_SCAN_RESTARTS: usize = 256;

/// Yields each balanced `{...}` substring of `text` in source order. When the
/// text ends inside an open object, scanning restarts one character after that
/// object's opening brace, at most [`MAX_SCAN_RESTARTS`] times.
#[derive(Debug)]
struct FragmentScan {
    text: String,
    cursor: usize,
    start: usize,
    restarts: usize,
    state: BraceState,
}

impl FragmentScan {
    fn new(text: String) -> Self {
        Self {
            text,
            cursor: 0,
            start: 0,
            restarts: 0,
            state: BraceState::default(),
        }
    }
}

impl Iterator for FragmentScan {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            let Some(ch) = self.text[self.cursor..].chars().next() else {
                if self.state.is_open() {
                    if self.restarts == MAX_SCAN_RESTARTS {
                        debug!(offset = self.start, "too many truncated fragments, stopping scan");
                        return None;
                    }
                    self.restarts += 1;
                    debug!(offset = self.start, "resuming scan after truncated fragment");
                    self.cursor = self.start + 1;
                    self.state.reset();
                    continue;
                }
                return None;
            };

            let at = self.cursor;
            self.cursor += ch.len_utf8();

            match self.state.step(ch) {
                BraceStep::Opened => self.start = at,
                BraceStep::Closed => return Some(self.text[self.start..self.cursor].to_string()),
                BraceStep::Outside | BraceStep::Inside => {}
            }
        }
    }
}

#[derive(Debug)]
enum ParsedSource {
    Array(std::vec::IntoIter<Value>),
    Scan(FragmentScan),
}

/// Lazy sequence of candidate records recovered from one block of model output.
#[derive(Debug)]
pub struct ParsedRecords {
    source: ParsedSource,
}

impl Iterator for ParsedRecords {
    type Item = CandidateRecord;

    fn next(&mut self) -> Option<CandidateRecord> {
        loop {
            match &mut self.source {
                ParsedSource::Array(values) => {
                    let value = values.next()?;
                    if let Some(record) = record_from_value(value) {
                        return Some(record);
                    }
                }
                ParsedSource::Scan(scan) => {
                    let fragment = scan.next()?;
                    if let Some(record) = parse_fragment(&fragment) {
                        return Some(record);
                    }
                }
            }
        }
    }
}

pub fn parse_records(text: &str) -> ParsedRecords {
    let cleaned = preprocess(text);
    let trimmed = cleaned.trim();

    if trimmed.starts_with('[') {
        if let Ok(values) = serde_json::from_str::<Vec<Value>>(trimmed) {
            return ParsedRecords {
                source: ParsedSource::Array(values.into_iter()),
            };
        }
        debug!("array framing did not parse, falling back to brace scan");
    }

    ParsedRecords {
        source: ParsedSource::Scan(FragmentScan::new(cleaned)),
    }
}

fn preprocess(text: &str) -> String {
    unescape_underscores(text)
        .lines()
        .filter(|line| !is_comment_line(line))
        .collect::<Vec<&str>>()
        .join("\n")
}

fn unescape_underscores(text: &str) -> String {
    text.replace("\\_", "_")
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Line-delimited parser for output that arrives in pieces. Incomplete trailing
/// lines are held until their newline arrives; lines that are not complete
/// objects on their own feed a brace scanner whose state survives across reads.
#[derive(Debug, Default)]
pub struct StreamingRecordParser {
    held: String,
    fragment: String,
    state: BraceState,
}

impl StreamingRecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<CandidateRecord> {
        let mut records = Vec::new();
        let search_from = self.held.len();
        self.held.push_str(chunk);

        let Some(last_newline) = self.held[search_from..].rfind('\n') else {
            return records;
        };

        let complete = self
            .held
            .drain(..search_from + last_newline + 1)
            .collect::<String>();
        for line in complete.lines() {
            self.consume_line(line, &mut records);
        }

        records
    }

    pub fn finish(mut self) -> Vec<CandidateRecord> {
        let mut records = Vec::new();

        let tail = std::mem::take(&mut self.held);
        if !tail.is_empty() {
            self.consume_line(&tail, &mut records);
        }

        if self.state.is_open() {
            debug!(
                pending_chars = self.fragment.len(),
                "stream ended inside an open fragment"
            );
            let remainder = self.fragment.get(1..).unwrap_or_default().to_string();
            records.extend(
                FragmentScan::new(remainder).filter_map(|fragment| parse_fragment(&fragment)),
            );
        }

        records
    }

    fn consume_line(&mut self, line: &str, records: &mut Vec<CandidateRecord>) {
        let line = unescape_underscores(line);
        if is_comment_line(&line) {
            return;
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            if let Some(parsed) = parse_standalone_line(trimmed) {
                if self.state.is_open() {
                    debug!(
                        pending_chars = self.fragment.len(),
                        "abandoning truncated fragment"
                    );
                    self.fragment.clear();
                    self.state.reset();
                }
                records.extend(parsed);
                return;
            }
        }

        for ch in line.chars().chain(std::iter::once('\n')) {
            match self.state.step(ch) {
                BraceStep::Outside => {}
                BraceStep::Opened => {
                    self.fragment.clear();
                    self.fragment.push(ch);
                }
                BraceStep::Inside => self.fragment.push(ch),
                BraceStep::Closed => {
                    self.fragment.push(ch);
                    if let Some(record) = parse_fragment(&self.fragment) {
                        records.push(record);
                    }
                    self.fragment.clear();
                }
            }
        }
    }
}

/// A line that is a whole record object or a whole array on its own.
fn parse_standalone_line(line: &str) -> Option<Vec<CandidateRecord>> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::Array(values) => Some(values.into_iter().filter_map(record_from_value).collect()),
        value @ Value::Object(_) => record_from_value(value).map(|record| vec![record]),
        _ => None,
    }
}

fn parse_fragment(fragment: &str) -> Option<CandidateRecord> {
    match serde_json::from_str::<Value>(fragment) {
        Ok(value) => {
            let record = record_from_value(value);
            if record.is_none() {
                debug!("discarding fragment without record keys");
            }
            record
        }
        Err(err) => {
            debug!(error = %err, chars = fragment.len(), "discarding malformed fragment");
            None
        }
    }
}

fn record_from_value(value: Value) -> Option<CandidateRecord> {
    let Value::Object(map) = value else {
        return None;
    };

    if !RECORD_KEYS.iter().any(|key| map.contains_key(*key)) {
        return None;
    }

    Some(CandidateRecord {
        test_name: field_text(&map, "test_name"),
        value: field_text(&map, "value"),
        unit: field_text(&map, "unit"),
        reference_range: field_text(&map, "reference_range"),
        report_date: field_text(&map, "report_date"),
    })
}

fn field_text(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        other => Some(other.to_string()),
    }
}
