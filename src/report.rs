//! Per-slide status and run summaries.
//!
//! A [`RunReport`] is what [`crate::orchestrator::Pipeline::run`] returns when
//! no fatal error occurred. It is serialisable so the CLI can print it as JSON.

use crate::error::SlideError;
use crate::layout::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Status of one slide within one stage execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum SlideStatus {
    Pending,
    InProgress,
    Done,
    /// Output was already complete when the stage began.
    Skipped,
    Failed(SlideError),
}

/// A slide that failed, as shown in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideFailure {
    pub slide: usize,
    pub error: String,
}

/// Summary of one executed stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Option<Stage>,
    /// Slides in the deck.
    pub total: usize,
    /// Slides whose output was already complete.
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: Vec<SlideFailure>,
    /// LLM input tokens (narration and polish only).
    pub input_tokens: u64,
    /// LLM output tokens (narration and polish only).
    pub output_tokens: u64,
    pub duration_ms: u64,
}

impl StageReport {
    pub fn new(stage: Stage, total: usize) -> Self {
        Self {
            stage: Some(stage),
            total,
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failed slide indices in ascending order.
    pub fn failed_slides(&self) -> Vec<usize> {
        self.failed.iter().map(|f| f.slide).collect()
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.stage.map(Stage::as_str).unwrap_or("?");
        write!(
            f,
            "{name:<12} total={} skipped={} ok={} failed={} ({} ms)",
            self.total,
            self.skipped,
            self.succeeded,
            self.failed.len(),
            self.duration_ms
        )?;
        if self.input_tokens > 0 || self.output_tokens > 0 {
            write!(
                f,
                " tokens={}/{}",
                self.input_tokens, self.output_tokens
            )?;
        }
        Ok(())
    }
}

/// Ordered stage summaries for one `run` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    /// The stage whose failures stopped the run, if any.
    pub halted_at: Option<Stage>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.halted_at.is_none() && self.stages.iter().all(StageReport::is_success)
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == Some(stage))
    }

    pub fn total_input_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.input_tokens).sum()
    }

    pub fn total_output_tokens(&self) -> u64 {
        self.stages.iter().map(|s| s.output_tokens).sum()
    }
}

/// Shared per-slide status for one stage, updated by concurrent workers.
#[derive(Debug)]
pub(crate) struct StatusBoard {
    slots: Mutex<BTreeMap<usize, SlideStatus>>,
    tokens: Mutex<(u64, u64)>,
}

impl StatusBoard {
    /// Seed the board: work-set slides start `Pending`, the rest `Skipped`.
    pub(crate) fn new(total: usize, pending: &[usize]) -> Self {
        let mut slots = BTreeMap::new();
        for slide in 1..=total {
            slots.insert(slide, SlideStatus::Skipped);
        }
        for &slide in pending {
            slots.insert(slide, SlideStatus::Pending);
        }
        Self {
            slots: Mutex::new(slots),
            tokens: Mutex::new((0, 0)),
        }
    }

    pub(crate) fn set(&self, slide: usize, status: SlideStatus) {
        // A poisoned lock only means another worker panicked mid-update;
        // the map itself is still consistent.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.insert(slide, status);
    }

    pub(crate) fn add_tokens(&self, input: u64, output: u64) {
        let mut t = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        t.0 += input;
        t.1 += output;
    }

    /// Fold the board into a report. Any slide still pending or in progress
    /// is counted as neither succeeded nor failed.
    pub(crate) fn into_report(self, stage: Stage, duration_ms: u64) -> StageReport {
        let slots = self.slots.into_inner().unwrap_or_else(|e| e.into_inner());
        let (input_tokens, output_tokens) =
            self.tokens.into_inner().unwrap_or_else(|e| e.into_inner());
        let mut report = StageReport::new(stage, slots.len());
        report.input_tokens = input_tokens;
        report.output_tokens = output_tokens;
        report.duration_ms = duration_ms;
        for (slide, status) in slots {
            match status {
                SlideStatus::Skipped => report.skipped += 1,
                SlideStatus::Done => report.succeeded += 1,
                SlideStatus::Failed(e) => report.failed.push(SlideFailure {
                    slide,
                    error: e.to_string(),
                }),
                SlideStatus::Pending | SlideStatus::InProgress => {}
            }
        }
        report
    }
}
