//! Event logging for the optimization pipeline and backend.
//!
//! Every transformation a pass performs is recorded as an [`Event`] in an
//! append-only [`EventLog`]. The log answers questions such as "which
//! functions did inlining touch" or "how many registers were spilled" without
//! any pass keeping its own counters. Events can be inspected in tests or
//! ignored entirely.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event (transformation, warning, info)
//! - [`EventLog`] - Collection of events with query and summary capabilities
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust,ignore
//! use ssaforge::compiler::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::ConstantFolded)
//!     .at("main", 3)
//!     .message("%add = 40 + 2 -> 42");
//! log.info("SCCP finished");
//! println!("{}", log.summary());
//! ```

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    time::Duration,
};

use strum::{EnumCount, EnumIter};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum EventKind {
    /// A value was folded to a constant.
    ConstantFolded,
    /// A conditional branch was simplified to an unconditional jump.
    BranchSimplified,
    /// An instruction was removed.
    InstructionRemoved,
    /// A basic block was removed.
    BlockRemoved,
    /// Two blocks were merged into one.
    BlockMerged,
    /// A call site was inlined.
    FunctionInlined,
    /// An unreachable function was removed from the module.
    FunctionRemoved,
    /// A phi was inserted during SSA construction.
    PhiInserted,
    /// A trivial phi was replaced by its single value.
    PhiSimplified,
    /// Phis were lowered into parallel copies.
    PhiEliminated,
    /// A loop-invariant instruction was hoisted to the preheader.
    InstructionHoisted,
    /// A redundant expression was replaced by an earlier result.
    ExpressionReused,
    /// An instruction was algebraically rewritten.
    InstructionCombined,
    /// A loop preheader was synthesized.
    PreheaderInserted,
    /// A critical edge was split.
    EdgeSplit,
    /// A virtual register was spilled to the stack.
    RegisterSpilled,
    /// A move was eliminated by coalescing.
    MoveCoalesced,
    /// A machine instruction was removed or rewritten by the peephole pass.
    PeepholeApplied,

    /// An optimization pass started.
    PassStarted,
    /// An optimization pass completed.
    PassCompleted,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            // Transformations
            Self::ConstantFolded => "constant folded",
            Self::BranchSimplified => "branch simplified",
            Self::InstructionRemoved => "instruction removed",
            Self::BlockRemoved => "block removed",
            Self::BlockMerged => "block merged",
            Self::FunctionInlined => "function inlined",
            Self::FunctionRemoved => "function removed",
            Self::PhiInserted => "phi inserted",
            Self::PhiSimplified => "phi simplified",
            Self::PhiEliminated => "phi eliminated",
            Self::InstructionHoisted => "instruction hoisted",
            Self::ExpressionReused => "expression reused",
            Self::InstructionCombined => "instruction combined",
            Self::PreheaderInserted => "preheader inserted",
            Self::EdgeSplit => "edge split",
            Self::RegisterSpilled => "register spilled",
            Self::MoveCoalesced => "move coalesced",
            Self::PeepholeApplied => "peephole applied",
            // Engine
            Self::PassStarted => "pass started",
            Self::PassCompleted => "pass completed",
            // Diagnostic
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a code transformation.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        !matches!(
            self,
            Self::PassStarted | Self::PassCompleted | Self::Info | Self::Warning | Self::Error
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// Name of the function where the event occurred (if applicable).
    pub function: Option<String>,
    /// Location within the function (block or instruction index).
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
    /// Associated pass name (if from a pass).
    pub pass: Option<String>,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
            pass: None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(function) => write!(f, "[{}] {function}: {}", self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<String>,
    location: Option<usize>,
    message: Option<String>,
    pass: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
            pass: None,
        }
    }

    /// Sets the function and location where the event occurred.
    pub fn at(mut self, function: impl Into<String>, location: usize) -> Self {
        self.function = Some(function.into());
        self.location = Some(location);
        self
    }

    /// Sets only the function (for function-level events).
    pub fn function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }

    /// Sets the location.
    pub fn location(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Associates this event with a specific pass.
    pub fn pass(mut self, pass_name: impl Into<String>) -> Self {
        self.pass = Some(pass_name.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        let event = Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
            pass: self.pass.take(),
        };

        self.log.events.push(event);
    }
}

/// Collection of events from a compilation.
///
/// Recording only needs a shared reference, so analyses holding `&EventLog`
/// can report without threading mutable state around.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Returns true if any of the given event kinds exist.
    #[must_use]
    pub fn has_any(&self, kinds: &[EventKind]) -> bool {
        self.events.iter().any(|(_, e)| kinds.contains(&e.kind))
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over events recorded for a function.
    pub fn filter_function<'a>(&'a self, function: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.iter()
            .filter(move |e| e.function.as_deref() == Some(function))
    }

    /// Returns an iterator over transformation events only.
    pub fn transformations(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_transformation())
    }

    /// Returns an iterator over diagnostic events only.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Event> + '_ {
        self.iter().filter(|e| e.kind.is_diagnostic())
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Returns the number of transformation events.
    #[must_use]
    pub fn transformation_count(&self) -> usize {
        self.transformations().count()
    }

    /// Returns the number of distinct functions with transformation events.
    #[must_use]
    pub fn functions_affected(&self) -> usize {
        self.transformations()
            .filter_map(|e| e.function.as_deref())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Generates a human-readable summary of all events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let counts = self.count_by_kind();

        let mut parts: Vec<String> = counts
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

/// Iterator wrapper for EventLog that yields &Event
pub struct EventLogIter<'a> {
    inner: boxcar::Iter<'a, Event>,
}

impl<'a> Iterator for EventLogIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl<'a> IntoIterator for &'a EventLog {
    type Item = &'a Event;
    type IntoIter = EventLogIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        EventLogIter {
            inner: self.events.iter(),
        }
    }
}

impl Extend<Event> for EventLog {
    fn extend<T: IntoIterator<Item = Event>>(&mut self, iter: T) {
        for event in iter {
            self.events.push(event);
        }
    }
}

impl FromIterator<Event> for EventLog {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        let log = Self::new();
        for event in iter {
            log.events.push(event);
        }
        log
    }
}

/// Statistics derived from an EventLog.
///
/// All numbers are computed from events; no pass tracks counters itself.
#[derive(Debug, Clone, Default)]
pub struct DerivedStats {
    /// Number of functions that had any transformations.
    pub functions_transformed: usize,
    /// Number of values folded to constants.
    pub constants_folded: usize,
    /// Number of instructions removed.
    pub instructions_removed: usize,
    /// Number of blocks removed or merged away.
    pub blocks_removed: usize,
    /// Number of branches simplified.
    pub branches_simplified: usize,
    /// Number of call sites inlined.
    pub functions_inlined: usize,
    /// Number of functions deleted.
    pub functions_removed: usize,
    /// Number of phis inserted by SSA construction.
    pub phis_inserted: usize,
    /// Number of instructions hoisted out of loops.
    pub instructions_hoisted: usize,
    /// Number of redundant expressions eliminated.
    pub expressions_reused: usize,
    /// Number of registers spilled.
    pub registers_spilled: usize,
    /// Number of moves coalesced.
    pub moves_coalesced: usize,
    /// Number of warnings.
    pub warnings: usize,
    /// Number of errors.
    pub errors: usize,
    /// Number of fixpoint iterations.
    pub iterations: usize,
    /// Processing time.
    pub total_time: Duration,
}

impl DerivedStats {
    /// Computes statistics from an event log.
    #[must_use]
    pub fn from_log(log: &EventLog) -> Self {
        let counts = log.count_by_kind();
        let get = |kind: EventKind| counts.get(&kind).copied().unwrap_or(0);

        Self {
            functions_transformed: log.functions_affected(),
            constants_folded: get(EventKind::ConstantFolded),
            instructions_removed: get(EventKind::InstructionRemoved),
            blocks_removed: get(EventKind::BlockRemoved) + get(EventKind::BlockMerged),
            branches_simplified: get(EventKind::BranchSimplified),
            functions_inlined: get(EventKind::FunctionInlined),
            functions_removed: get(EventKind::FunctionRemoved),
            phis_inserted: get(EventKind::PhiInserted),
            instructions_hoisted: get(EventKind::InstructionHoisted),
            expressions_reused: get(EventKind::ExpressionReused),
            registers_spilled: get(EventKind::RegisterSpilled),
            moves_coalesced: get(EventKind::MoveCoalesced),
            warnings: get(EventKind::Warning),
            errors: get(EventKind::Error),
            iterations: 0,
            total_time: Duration::ZERO,
        }
    }

    /// Sets the total processing time.
    #[must_use]
    pub fn with_time(mut self, time: Duration) -> Self {
        self.total_time = time;
        self
    }

    /// Sets the number of iterations.
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Generates a human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let counters = [
            (self.functions_transformed, "functions"),
            (self.constants_folded, "constants folded"),
            (self.instructions_removed, "instructions removed"),
            (self.blocks_removed, "blocks removed"),
            (self.branches_simplified, "branches simplified"),
            (self.functions_inlined, "inlined"),
            (self.functions_removed, "functions removed"),
            (self.phis_inserted, "phis"),
            (self.instructions_hoisted, "hoisted"),
            (self.expressions_reused, "reused"),
            (self.registers_spilled, "spilled"),
            (self.moves_coalesced, "coalesced"),
            (self.errors, "errors"),
            (self.warnings, "warnings"),
        ];
        let parts: Vec<String> = counters
            .iter()
            .filter(|(count, _)| *count > 0)
            .map(|(count, label)| format!("{count} {label}"))
            .collect();

        let stats = if parts.is_empty() {
            "no transformations".to_string()
        } else {
            parts.join(", ")
        };

        if self.total_time.as_millis() > 0 {
            format!(
                "{} in {:?} ({} iterations)",
                stats, self.total_time, self.iterations
            )
        } else {
            stats
        }
    }
}

impl fmt::Display for DerivedStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_empty_log() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
        assert!(!log.has(EventKind::ConstantFolded));
        assert_eq!(log.summary(), "no events");
    }

    #[test]
    fn test_record_event() {
        let log = EventLog::new();

        log.record(EventKind::ConstantFolded)
            .at("main", 4)
            .message("%x = 42");

        assert_eq!(log.len(), 1);
        let event = log.iter().next().unwrap();
        assert_eq!(event.function.as_deref(), Some("main"));
        assert_eq!(event.location, Some(4));
        assert_eq!(event.message, "%x = 42");
        assert_eq!(event.to_string(), "[constant folded] main: %x = 42");
    }

    #[test]
    fn test_default_message() {
        let log = EventLog::new();
        log.record(EventKind::PhiInserted).function("f");
        assert_eq!(log.iter().next().unwrap().message, "phi inserted");
    }

    #[test]
    fn test_info_warn_error() {
        let log = EventLog::new();
        log.info("informational message");
        log.warn("warning message");
        log.error("error message");

        assert_eq!(log.count_kind(EventKind::Info), 1);
        assert_eq!(log.count_kind(EventKind::Warning), 1);
        assert_eq!(log.count_kind(EventKind::Error), 1);
        assert_eq!(log.diagnostics().count(), 3);
        assert_eq!(log.transformation_count(), 0);
        assert_eq!(log.summary(), "3 events");
    }

    #[test]
    fn test_merge_and_has_any() {
        let log1 = EventLog::new();
        let log2 = EventLog::new();
        log1.record(EventKind::BlockRemoved).at("f", 1);
        log2.record(EventKind::FunctionInlined).at("g", 0);

        log1.merge(&log2);
        assert_eq!(log1.len(), 2);
        assert!(log1.has_any(&[EventKind::FunctionInlined, EventKind::RegisterSpilled]));
        assert!(!log1.has_any(&[EventKind::RegisterSpilled]));
    }

    #[test]
    fn test_summary_sorted() {
        let log = EventLog::new();
        log.record(EventKind::InstructionRemoved).at("f", 1);
        log.record(EventKind::InstructionRemoved).at("f", 2);
        log.record(EventKind::ConstantFolded).at("f", 3);
        log.info("ignored");

        assert_eq!(log.summary(), "1 constant folded, 2 instruction removed");
    }

    #[test]
    fn test_filter_function() {
        let log = EventLog::new();
        log.record(EventKind::ConstantFolded).at("f", 0);
        log.record(EventKind::BlockMerged).at("g", 0);
        log.record(EventKind::InstructionRemoved).at("f", 1);

        assert_eq!(log.filter_function("f").count(), 2);
        assert_eq!(log.functions_affected(), 2);
    }

    #[test]
    fn test_derived_stats() {
        let log = EventLog::new();
        log.record(EventKind::RegisterSpilled).at("main", 7);
        log.record(EventKind::BlockRemoved).at("main", 2);
        log.record(EventKind::BlockMerged).at("f", 3);
        log.warn("a warning");

        let stats = DerivedStats::from_log(&log).with_iterations(2);
        assert_eq!(stats.functions_transformed, 2);
        assert_eq!(stats.registers_spilled, 1);
        assert_eq!(stats.blocks_removed, 2);
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.iterations, 2);
        assert!(stats.summary().contains("1 spilled"));
    }

    #[test]
    fn test_kind_classification_is_exclusive() {
        assert_eq!(EventKind::iter().count(), EventKind::COUNT);
        for kind in EventKind::iter() {
            assert!(!(kind.is_transformation() && kind.is_diagnostic()), "{kind}");
        }
    }

    #[test]
    fn test_collect_from_iterator() {
        let source = EventLog::new();
        source.record(EventKind::EdgeSplit).at("f", 0);
        source.record(EventKind::PeepholeApplied).at("f", 1);
        let copy: EventLog = source.iter().cloned().collect();
        assert_eq!(copy.len(), 2);
        assert_eq!((&copy).into_iter().count(), 2);
    }
}
