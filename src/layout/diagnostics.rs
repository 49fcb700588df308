//! Diagnostics context injected into routing calls.
//!
//! Degenerate geometry is recoverable: the router substitutes an emergency
//! route and reports enough context here to diagnose the layout afterwards.
//! The default sink does nothing, so production layouts pay only for a
//! virtual call.

use serde::Serialize;

use super::Point;

/// Orchestrator pass identifiers, e.g. pass 2 / sub-pass 1 "link routing".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassId {
    pub pass: usize,
    pub sub_pass: usize,
    pub label: String,
}

impl PassId {
    pub fn new(pass: usize, sub_pass: usize, label: &str) -> Self {
        Self {
            pass,
            sub_pass,
            label: label.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureContext {
    pub cluster: String,
    pub step: &'static str,
    pub pass: Option<PassId>,
    pub link: String,
    pub attempted: Option<Point>,
    pub partial_route: Vec<Point>,
    pub reason: String,
}

pub trait LayoutDiagnostics {
    fn enter_pass(&mut self, _pass: PassId) {}

    fn current_pass(&self) -> Option<&PassId> {
        None
    }

    fn degenerate(&mut self, _context: FailureContext) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiagnostics;

impl LayoutDiagnostics for NoopDiagnostics {}

/// Keeps every pass and failure for inspection after a layout attempt.
#[derive(Debug, Clone, Default)]
pub struct RecordingDiagnostics {
    pub passes: Vec<PassId>,
    pub failures: Vec<FailureContext>,
}

impl LayoutDiagnostics for RecordingDiagnostics {
    fn enter_pass(&mut self, pass: PassId) {
        self.passes.push(pass);
    }

    fn current_pass(&self) -> Option<&PassId> {
        self.passes.last()
    }

    fn degenerate(&mut self, context: FailureContext) {
        self.failures.push(context);
    }
}

pub(crate) fn report(diag: &mut dyn LayoutDiagnostics, mut context: FailureContext) {
    context.pass = diag.current_pass().cloned();
    tracing::warn!(
        cluster = %context.cluster,
        step = context.step,
        link = %context.link,
        attempted = ?context.attempted,
        pass = ?context.pass,
        "{}; using emergency route",
        context.reason
    );
    diag.degenerate(context);
}
