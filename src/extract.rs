//! Timestamp extraction from paths and CLI tokens.
//!
//! The default heuristic never reads file contents: it tokenizes the string,
//! keeps the time-like tokens, and fills timestamp fields from them using
//! constraint-based elimination (a value of 31 cannot be a month). Formats
//! the heuristic cannot handle get a named extractor in the registry.

use crate::epoch;
use crate::error::{Error, Result};
use chrono::{DateTime, Local, LocalResult, TimeZone};
use std::path::Path;
use tracing::debug;

/// A format-specific extraction function.
pub type ExtractFn = fn(&str) -> Option<DateTime<Local>>;

/// Split a string on the separator set `{ /, ., _, whitespace }` plus `-`
/// when the dash touches a letter. A dash between digits is kept so that
/// ISO dates like `2014-01-31` survive as one token.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for (i, &c) in chars.iter().enumerate() {
        let is_sep = match c {
            '/' | '.' | '_' => true,
            '-' => {
                let before = i
                    .checked_sub(1)
                    .and_then(|j| chars.get(j))
                    .is_some_and(|p| p.is_alphabetic());
                let after = chars.get(i + 1).is_some_and(|n| n.is_alphabetic());
                before || after
            }
            c => c.is_whitespace(),
        };
        if is_sep {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// A token consisting only of digits, `:`, and `-`.
pub(crate) fn is_time_like(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_digit() || c == ':' || c == '-')
}

/// Partially-filled timestamp fields. Anything left unset at build time is
/// filled with its minimum; a build with no year at all is a failed parse.
#[derive(Debug, Default)]
struct Fields {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
}

impl Fields {
    fn feed(&mut self, token: &str) {
        if token.contains(':') {
            self.feed_clock(token);
        } else if token.contains('-') {
            self.feed_dashed_date(token);
        } else {
            self.feed_digits(token);
        }
    }

    /// `HH:MM` or `HH:MM:SS`.
    fn feed_clock(&mut self, token: &str) {
        let parts: Vec<&str> = token.split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return;
        }
        let nums: Option<Vec<u32>> = parts.iter().map(|p| p.parse().ok()).collect();
        if let Some(nums) = nums {
            self.hour.get_or_insert(nums[0]);
            self.minute.get_or_insert(nums[1]);
            if let Some(&s) = nums.get(2) {
                self.second.get_or_insert(s);
            }
        }
    }

    /// `Y-M-D`, `M-D-Y`, `D-M-Y`, or `Y-M`; the 4-digit component is the year.
    fn feed_dashed_date(&mut self, token: &str) {
        let parts: Vec<&str> = token.split('-').filter(|p| !p.is_empty()).collect();
        let nums: Option<Vec<u32>> = parts.iter().map(|p| p.parse().ok()).collect();
        let Some(nums) = nums else { return };
        match parts.len() {
            3 if parts[0].len() == 4 => {
                self.year.get_or_insert(nums[0] as i32);
                self.month.get_or_insert(nums[1]);
                self.day.get_or_insert(nums[2]);
            }
            3 if parts[2].len() == 4 => {
                self.year.get_or_insert(nums[2] as i32);
                // Eliminate the impossible reading before assuming M-D order.
                let (a, b) = (nums[0], nums[1]);
                if a > 12 {
                    self.day.get_or_insert(a);
                    self.month.get_or_insert(b);
                } else {
                    self.month.get_or_insert(a);
                    self.day.get_or_insert(b);
                }
            }
            2 if parts[0].len() == 4 => {
                self.year.get_or_insert(nums[0] as i32);
                self.month.get_or_insert(nums[1]);
            }
            _ => {}
        }
    }

    /// Bare digit runs: compact stamps by length, small numbers by the first
    /// field whose range still admits them.
    fn feed_digits(&mut self, token: &str) {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
            return;
        }
        match token.len() {
            // Compact stamps. Ten-digit runs are deliberately not a date:
            // they are far more likely to be epoch seconds, which the
            // fallback handles.
            14 | 12 | 8 => {
                let year: i32 = match token[0..4].parse() {
                    Ok(y) => y,
                    Err(_) => return,
                };
                self.year.get_or_insert(year);
                self.month.get_or_insert(token[4..6].parse().unwrap_or(1));
                self.day.get_or_insert(token[6..8].parse().unwrap_or(1));
                if token.len() >= 12 {
                    self.hour.get_or_insert(token[8..10].parse().unwrap_or(0));
                    self.minute.get_or_insert(token[10..12].parse().unwrap_or(0));
                }
                if token.len() == 14 {
                    self.second.get_or_insert(token[12..14].parse().unwrap_or(0));
                }
            }
            6 => {
                // HHMMSS, but only once a date is already in hand.
                if self.year.is_some() && self.hour.is_none() {
                    let (h, m, s) = (
                        token[0..2].parse().unwrap_or(99),
                        token[2..4].parse().unwrap_or(99),
                        token[4..6].parse().unwrap_or(99),
                    );
                    if h <= 23 && m <= 59 && s <= 60 {
                        self.hour = Some(h);
                        self.minute = Some(m);
                        self.second = Some(s);
                    }
                }
            }
            4 => {
                let v: u32 = token.parse().unwrap_or(0);
                if self.year.is_none() && v >= 1000 {
                    self.year = Some(v as i32);
                } else if self.hour.is_none() && v / 100 <= 23 && v % 100 <= 59 {
                    self.hour = Some(v / 100);
                    self.minute = Some(v % 100);
                }
            }
            1 | 2 => {
                let v: u32 = match token.parse() {
                    Ok(v) => v,
                    Err(_) => return,
                };
                if self.month.is_none() && (1..=12).contains(&v) {
                    self.month = Some(v);
                } else if self.day.is_none() && (1..=31).contains(&v) {
                    self.day = Some(v);
                } else if self.hour.is_none() && v <= 23 {
                    self.hour = Some(v);
                } else if self.minute.is_none() && v <= 59 {
                    self.minute = Some(v);
                } else if self.second.is_none() && v <= 60 {
                    self.second = Some(v);
                }
            }
            _ => {}
        }
    }

    fn build(&self) -> Option<DateTime<Local>> {
        let year = self.year?;
        local_datetime(
            year,
            self.month.unwrap_or(1),
            self.day.unwrap_or(1),
            self.hour.unwrap_or(0),
            self.minute.unwrap_or(0),
            self.second.unwrap_or(0),
        )
    }
}

fn local_datetime(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Option<DateTime<Local>> {
    match Local.with_ymd_and_hms(y, mo, d, h, mi, s) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => None,
    }
}

fn parse_tokens(tokens: &[String]) -> Option<DateTime<Local>> {
    let mut fields = Fields::default();
    for token in tokens {
        fields.feed(token);
    }
    fields.build()
}

/// Interpret the first two retained tokens joined by `.` as epoch seconds.
/// Catches stamps like `1390158000.552` that the separator split in two.
fn epoch_fallback(tokens: &[String]) -> Option<DateTime<Local>> {
    let joined = match tokens {
        [] => return None,
        [a] => a.clone(),
        [a, b, ..] => format!("{a}.{b}"),
    };
    joined.parse::<f64>().ok().and_then(epoch::from_epoch)
}

/// Default heuristic: `@epoch` shortcut, then token parse, then the epoch
/// fallback. Returns `None` when nothing time-like can be recognized.
pub fn extract(text: &str) -> Option<DateTime<Local>> {
    if let Some(rest) = text.strip_prefix('@') {
        return rest.parse::<f64>().ok().and_then(epoch::from_epoch);
    }
    let tokens: Vec<String> = tokenize(text)
        .into_iter()
        .filter(|t| is_time_like(t))
        .collect();
    if tokens.is_empty() {
        debug!(text, "no time-like tokens");
        return None;
    }
    parse_tokens(&tokens).or_else(|| epoch_fallback(&tokens))
}

/// Bluecoat proxy logs carry the year only in the directory chain; the
/// basename holds month/day/time as the last ten digits of its stem.
fn bluecoat(text: &str) -> Option<DateTime<Local>> {
    let path = Path::new(text);
    let year = path
        .parent()?
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .find(|c| c.len() == 4 && c.chars().all(|ch| ch.is_ascii_digit()))?;
    let stem = path.file_name()?.to_str()?.split('.').next()?;
    let digits: String = stem.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return None;
    }
    let compact = format!("{year}{}", &digits[digits.len() - 10..]);
    parse_tokens(&[compact])
}

struct RegistryEntry {
    name: &'static str,
    description: &'static str,
    func: ExtractFn,
}

/// Named per-format extractors.
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

impl Registry {
    pub fn builtin() -> Self {
        Self {
            entries: vec![
                RegistryEntry {
                    name: "default",
                    description: "token heuristic with @epoch shortcut",
                    func: extract,
                },
                RegistryEntry {
                    name: "bluecoat",
                    description: "Blue Coat SG access logs (year directory + stem digits)",
                    func: bluecoat,
                },
            ],
        }
    }

    /// Resolve an optional extractor name; `None` or the empty string means
    /// the default heuristic. Unknown names are a configuration error.
    pub fn resolve(&self, name: Option<&str>) -> Result<ExtractFn> {
        match name {
            None | Some("") => Ok(extract),
            Some(name) => self
                .entries
                .iter()
                .find(|e| e.name == name)
                .map(|e| e.func)
                .ok_or_else(|| Error::UnknownExtractor(name.to_string())),
        }
    }

    /// Names and one-line descriptions, in registration order.
    pub fn entries(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.entries.iter().map(|e| (e.name, e.description))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
