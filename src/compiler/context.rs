//! Shared state of one pipeline run.
//!
//! The [`CompilerContext`] carries what every pass needs besides the module
//! itself: the configuration and the event log. Analyses are not cached here;
//! passes recompute them in [`crate::compiler::SsaPass::initialize`] because any
//! CFG-mutating pass invalidates them.

use std::time::{Duration, Instant};

use crate::compiler::{config::PipelineConfig, events::EventLog};

/// Compiler context for the optimization pipeline.
pub struct CompilerContext {
    /// Pipeline configuration.
    pub config: PipelineConfig,

    /// Accumulated events from all passes and the backend.
    pub events: EventLog,

    /// When compilation started.
    start_time: Instant,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl CompilerContext {
    /// Creates a new compiler context.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            events: EventLog::new(),
            start_time: Instant::now(),
        }
    }

    /// Returns the elapsed time since compilation started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Consumes the context, returning its event log.
    #[must_use]
    pub fn into_events(self) -> EventLog {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::EventKind;

    #[test]
    fn test_context_collects_events() {
        let ctx = CompilerContext::default();
        ctx.events.record(EventKind::BlockRemoved).at("main", 2);
        assert_eq!(ctx.config.inline_threshold, 120);
        let events = ctx.into_events();
        assert_eq!(events.count_kind(EventKind::BlockRemoved), 1);
    }
}
