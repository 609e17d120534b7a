//! Pattern-based PII detection.
//!
//! Findings carry the kind, byte span and matched text so blocked attempts can
//! be audited. Log the kind only; the text is the PII itself.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use flixdb_core::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    CreditCard,
    Ssn,
    Email,
    PhoneUs,
    PhoneIntl,
    AccountNumber,
    IpAddress,
    DateOfBirth,
}

impl PiiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PiiKind::CreditCard => "credit_card",
            PiiKind::Ssn => "ssn",
            PiiKind::Email => "email",
            PiiKind::PhoneUs => "phone_us",
            PiiKind::PhoneIntl => "phone_intl",
            PiiKind::AccountNumber => "account_number",
            PiiKind::IpAddress => "ip_address",
            PiiKind::DateOfBirth => "date_of_birth",
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiFinding {
    pub kind: PiiKind,
    pub start: usize,
    pub end: usize,
    pub matched_text: String,
}

impl PiiFinding {
    fn new(kind: PiiKind, text: &str, start: usize, end: usize) -> Self {
        Self { kind, start, end, matched_text: text[start..end].to_string() }
    }

    fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && self.start < end
    }
}

/// Compiled pattern set. Patterns are tried in priority order and a match
/// overlapping an earlier accepted finding is dropped, so a card number is
/// never also reported as a phone number.
pub struct PiiDetector {
    patterns: Vec<(PiiKind, Regex)>,
}

impl PiiDetector {
    pub fn new() -> Result<Self> {
        let specs = [
            // Any digit run; card windows inside it are picked out by `card_spans`.
            (PiiKind::CreditCard, r"\b\d(?:[ -]?\d)*\b"),
            (PiiKind::Ssn, r"\b\d{3}[- ]\d{2}[- ]\d{4}\b"),
            (PiiKind::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
            (PiiKind::PhoneUs, r"(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b"),
            (PiiKind::PhoneIntl, r"\+\d{1,3}[-.\s]?\d{1,4}[-.\s]?\d{1,4}[-.\s]?\d{1,9}\b"),
            (PiiKind::AccountNumber, r"(?i)\b(?:account|acct|member)[\s#:]*\d{6,}\b"),
            (
                PiiKind::IpAddress,
                r"\b(?:(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\.){3}(?:25[0-5]|2[0-4]\d|1\d\d|[1-9]?\d)\b",
            ),
            (PiiKind::DateOfBirth, r"(?i)\b(?:dob|birth|born)[\s:]*\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}\b"),
        ];
        let mut patterns = Vec::with_capacity(specs.len());
        for (kind, pattern) in specs {
            let re = Regex::new(pattern).map_err(|e| Error::InvalidConfig(format!("pii pattern {kind}: {e}")))?;
            patterns.push((kind, re));
        }
        Ok(Self { patterns })
    }

    /// All findings in `text`, ordered by position.
    pub fn scan(&self, text: &str) -> Vec<PiiFinding> {
        let mut found: Vec<PiiFinding> = Vec::new();
        for (kind, re) in &self.patterns {
            for m in re.find_iter(text) {
                let spans: Vec<(usize, usize)> = if *kind == PiiKind::CreditCard {
                    card_spans(m.as_str()).into_iter().map(|(s, e)| (m.start() + s, m.start() + e)).collect()
                } else {
                    vec![(m.start(), m.end())]
                };
                for (start, end) in spans {
                    if found.iter().any(|f| f.overlaps(start, end)) {
                        continue;
                    }
                    found.push(PiiFinding::new(*kind, text, start, end));
                }
            }
        }
        found.sort_by_key(|f| (f.start, f.end));
        found
    }

    pub fn contains_pii(&self, text: &str) -> bool {
        !self.scan(text).is_empty()
    }

    /// Distinct kinds found, in priority order.
    pub fn kinds(&self, text: &str) -> Vec<PiiKind> {
        let mut kinds: Vec<PiiKind> = self.scan(text).into_iter().map(|f| f.kind).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

const CARD_LENGTHS: std::ops::RangeInclusive<usize> = 13..=19;

/// Luhn-valid 13-19 digit windows of a digit run, as byte spans into `run`.
///
/// Windows start and end on digit-group boundaries, so a card followed by an
/// expiry, a CVV or an amount is still found. The longest window wins at each
/// start and scanning resumes after it.
fn card_spans(run: &str) -> Vec<(usize, usize)> {
    let digits: Vec<(usize, u32)> = run.char_indices().filter_map(|(i, c)| c.to_digit(10).map(|d| (i, d))).collect();
    let values: Vec<u32> = digits.iter().map(|&(_, d)| d).collect();
    let n = digits.len();
    let group_start = |i: usize| i == 0 || digits[i].0 != digits[i - 1].0 + 1;
    let group_end = |i: usize| i + 1 == n || digits[i + 1].0 != digits[i].0 + 1;

    let mut spans = Vec::new();
    let mut i = 0;
    while i < n {
        let hit = if group_start(i) {
            CARD_LENGTHS.rev().map(|len| i + len - 1).find(|&j| j < n && group_end(j) && luhn_valid(&values[i..=j]))
        } else {
            None
        };
        match hit {
            Some(j) => {
                spans.push((digits[i].0, digits[j].0 + 1));
                i = j + 1;
            }
            None => i += 1,
        }
    }
    spans
}

fn luhn_valid(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
