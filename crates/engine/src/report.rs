use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::FailureClass;

/// What happened to one scene during a cycle. A scene can be discovered,
/// stored and registered all in the same run.
#[derive(Debug, Default, Clone)]
pub struct SceneOutcome {
    pub scene_id: String,
    pub newly_discovered: bool,
    pub newly_stored: bool,
    pub newly_registered: bool,
    /// Left `Discovered` awaiting a usable asset manifest.
    pub pending: bool,
    /// Terminal record (already registered, or failed and excluded).
    pub skipped: bool,
    pub failure: Option<SceneFailure>,
}

impl SceneOutcome {
    pub fn new(scene_id: impl Into<String>) -> Self {
        SceneOutcome {
            scene_id: scene_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SceneFailure {
    pub class: FailureClass,
    pub message: String,
    /// The failure budget was exhausted and the record is now `Failed`.
    pub exhausted: bool,
}

/// Summary of one synchronization cycle, returned to the driver and logged
/// for operators.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub scenes_seen: usize,
    pub discovered: usize,
    pub stored: usize,
    pub registered: usize,
    pub pending: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Scenes newly excluded after crossing the failure threshold.
    pub exhausted: usize,
    /// First error message observed per failure class.
    pub first_errors: BTreeMap<String, String>,
}

impl CycleReport {
    pub fn new(window_start: NaiveDate, window_end: NaiveDate) -> Self {
        CycleReport {
            window_start,
            window_end,
            scenes_seen: 0,
            discovered: 0,
            stored: 0,
            registered: 0,
            pending: 0,
            skipped: 0,
            failed: 0,
            exhausted: 0,
            first_errors: BTreeMap::new(),
        }
    }

    pub fn tally(&mut self, outcome: &SceneOutcome) {
        if outcome.newly_discovered {
            self.discovered += 1;
        }
        if outcome.newly_stored {
            self.stored += 1;
        }
        if outcome.newly_registered {
            self.registered += 1;
        }
        if outcome.pending {
            self.pending += 1;
        }
        if outcome.skipped {
            self.skipped += 1;
        }
        if let Some(failure) = &outcome.failure {
            self.failed += 1;
            if failure.exhausted {
                self.exhausted += 1;
            }
            self.record_error(failure.class, &failure.message);
        }
    }

    /// Keep the first error per class; later ones add nothing for triage.
    pub fn record_error(&mut self, class: FailureClass, message: &str) {
        self.first_errors
            .entry(class.as_str().to_string())
            .or_insert_with(|| message.to_string());
    }
}

impl std::fmt::Display for CycleReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cycle {}..{}: seen {}, discovered {}, stored {}, registered {}, pending {}, skipped {}, failed {} ({} exhausted)",
            self.window_start,
            self.window_end,
            self.scenes_seen,
            self.discovered,
            self.stored,
            self.registered,
            self.pending,
            self.skipped,
            self.failed,
            self.exhausted,
        )
    }
}
