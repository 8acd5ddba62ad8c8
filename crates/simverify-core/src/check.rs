//! Check identities, per-check reports, and the run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which check sequence to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fast smoke test: is the app installed, are the assets there. Stops at
    /// the first failure, including the first missing asset file.
    Basic,
    /// Full diagnostic run. Every check executes and every asset is reported.
    #[default]
    Complete,
}

impl Mode {
    /// Checks executed by this mode, in order.
    pub fn checks(self) -> &'static [CheckKind] {
        match self {
            Mode::Basic => &[CheckKind::Installed, CheckKind::SourceFiles],
            Mode::Complete => &[
                CheckKind::SourceFiles,
                CheckKind::BundledAssets,
                CheckKind::SimulatorState,
                CheckKind::Installed,
                CheckKind::AppLaunch,
            ],
        }
    }

    /// Whether the first failed check ends the run.
    pub fn stops_on_failure(self) -> bool {
        matches!(self, Mode::Basic)
    }
}

/// One step of the verification sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Model asset files exist in the source assets directory.
    SourceFiles,
    /// The built app carries its models directory.
    BundledAssets,
    /// The simulator is booted, booting it if needed.
    SimulatorState,
    /// The bundle id appears in the simulator's installed apps.
    Installed,
    /// The app launches and reports a process id.
    AppLaunch,
}

impl CheckKind {
    /// Heading printed when the check starts.
    pub fn title(self) -> &'static str {
        match self {
            CheckKind::SourceFiles => "Checking source model files...",
            CheckKind::BundledAssets => "Checking built app with bundled assets...",
            CheckKind::SimulatorState => "Checking simulator state...",
            CheckKind::Installed => "Checking app installation...",
            CheckKind::AppLaunch => "Testing app launch...",
        }
    }
}

/// Outcome of a single check plus every status line it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub kind: CheckKind,
    pub passed: bool,
    /// Status lines without the transcript indent.
    pub lines: Vec<String>,
}

/// Aggregate result of one verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    /// Wall time of the whole run.
    pub elapsed_ms: u64,
    /// Checks that passed.
    pub passed: usize,
    /// Checks attempted. A basic run that stops early counts only those run.
    pub total: usize,
    /// Set when a basic run stopped before executing every check.
    pub aborted: bool,
    /// Process id reported by the launch check, if it ran and succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    /// Reports in execution order.
    pub checks: Vec<CheckReport>,
}

impl RunSummary {
    /// An empty summary stamped with the current time.
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            started_at: Utc::now(),
            elapsed_ms: 0,
            passed: 0,
            total: 0,
            aborted: false,
            process_id: None,
            checks: Vec::new(),
        }
    }

    /// Appends a finished check and updates the counters.
    pub fn record(&mut self, report: CheckReport) {
        self.total += 1;
        if report.passed {
            self.passed += 1;
        }
        self.checks.push(report);
    }

    /// Attempted checks that did not pass.
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    /// `true` when every attempted check passed and the run was not cut short.
    pub fn all_passed(&self) -> bool {
        !self.aborted && self.total > 0 && self.passed == self.total
    }

    /// Report for `kind`, if that check ran.
    pub fn report(&self, kind: CheckKind) -> Option<&CheckReport> {
        self.checks.iter().find(|c| c.kind == kind)
    }
}
