//! Block scanner
//!
//! Generic trigger-driven scan over a [`LineWindow`]. A scan walks the window
//! line by line; when a line matches the trigger of a [`Rule`], the rule's
//! handler parses the block starting at that line and reports how many lines
//! it consumed, and the scan resumes right after them.
//!
//! Rule tables are plain slices built by the caller. The "already matched"
//! bookkeeping for one-shot rules lives inside a single [`scan`] call.

use crate::types::Result;
use crate::window::{LineWindow, Parsed};
use std::collections::BTreeMap;
use tracing::trace;

/// Line predicate used to start or stop a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Line starts with the text
    Prefix(&'static str),
    /// Line contains the text anywhere
    Contains(&'static str),
    /// Empty line
    Empty,
}

impl Trigger {
    #[inline]
    pub fn matches(&self, line: &str) -> bool {
        match self {
            Trigger::Prefix(p) => line.starts_with(p),
            Trigger::Contains(s) => line.contains(s),
            Trigger::Empty => line.is_empty(),
        }
    }
}

/// Block handler: parses the block whose first line is the trigger line
pub type Handler<'h, T> = dyn Fn(LineWindow<'_>) -> Result<Parsed<T>> + 'h;

/// One entry of a rule table
pub struct Rule<'h, T> {
    /// Key under which the parsed block is reported
    pub subject: &'static str,
    pub trigger: Trigger,
    /// Whether the rule may fire more than once per scan
    pub recurs: bool,
    handler: &'h Handler<'h, T>,
}

impl<'h, T> Rule<'h, T> {
    /// Rule that fires at most once per scan
    pub fn once(subject: &'static str, trigger: Trigger, handler: &'h Handler<'h, T>) -> Self {
        Self {
            subject,
            trigger,
            recurs: false,
            handler,
        }
    }

    /// Rule that fires on every matching line
    pub fn recurring(
        subject: &'static str,
        trigger: Trigger,
        handler: &'h Handler<'h, T>,
    ) -> Self {
        Self {
            subject,
            trigger,
            recurs: true,
            handler,
        }
    }
}

/// Result of a scan
#[derive(Debug, Clone, PartialEq)]
pub struct Scan<T> {
    /// Parsed blocks in file order, tagged with their rule subject
    pub entries: Vec<(&'static str, T)>,
    /// Lines consumed by the whole scan
    pub consumed: usize,
    /// True when the scan ran off the end of the window instead of stopping
    /// on a stop line
    pub exhausted: bool,
}

impl<T> Scan<T> {
    /// First block reported under `subject`
    pub fn get(&self, subject: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(s, _)| *s == subject)
            .map(|(_, v)| v)
    }

    pub fn all<'s>(&'s self, subject: &'s str) -> impl Iterator<Item = &'s T> + 's {
        self.entries
            .iter()
            .filter(move |(s, _)| *s == subject)
            .map(|(_, v)| v)
    }

    pub fn count(&self, subject: &str) -> usize {
        self.entries.iter().filter(|(s, _)| *s == subject).count()
    }

    pub fn into_values(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    /// Subject-keyed map; for a recurring subject the last block wins
    pub fn into_map(self) -> BTreeMap<&'static str, T> {
        self.entries.into_iter().collect()
    }
}

/// Scan `window` with `rules` until a line matches one of `stop` or input ends.
///
/// The stop line itself is not consumed. The first rule (in table order) whose
/// trigger matches a line handles it; non-matching lines are skipped.
pub fn scan<T>(
    window: LineWindow<'_>,
    rules: &[Rule<'_, T>],
    stop: &[Trigger],
) -> Result<Scan<T>> {
    let mut matched = vec![false; rules.len()];
    let mut entries = Vec::new();
    let mut pos = 0;

    while let Some(line) = window.get(pos) {
        if stop.iter().any(|t| t.matches(line)) {
            trace!(line = window.offset() + pos, "scan stopped");
            return Ok(Scan {
                entries,
                consumed: pos,
                exhausted: false,
            });
        }

        let hit = rules
            .iter()
            .enumerate()
            .find(|(i, r)| (r.recurs || !matched[*i]) && r.trigger.matches(line));

        match hit {
            Some((i, rule)) => {
                let rest = window.advance(pos);
                let parsed = (rule.handler)(rest)?;
                debug_assert!(
                    parsed.consumed >= 1 && parsed.consumed <= rest.len(),
                    "handler '{}' reported {} lines out of {}",
                    rule.subject,
                    parsed.consumed,
                    rest.len()
                );
                trace!(
                    subject = rule.subject,
                    line = rest.offset(),
                    consumed = parsed.consumed,
                    "block parsed"
                );
                matched[i] = true;
                entries.push((rule.subject, parsed.value));
                pos += parsed.consumed.clamp(1, rest.len());
            }
            None => pos += 1,
        }
    }

    Ok(Scan {
        entries,
        consumed: window.len(),
        exhausted: true,
    })
}

/// Contiguous run of lines up to (excluding) the first line matching `is_end`
pub fn take_block<'a, F>(window: LineWindow<'a>, is_end: F) -> Parsed<LineWindow<'a>>
where
    F: FnMut(&'a str) -> bool,
{
    let end = window.position(is_end).unwrap_or(window.len());
    Parsed::new(window.take(end), end)
}

// ============================================================================
// Tests
// ============================================================================
