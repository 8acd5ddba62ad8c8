//! The verification run: a fixed sequence of checks and its transcript.
//!
//! [`VerificationRunner`] owns the configuration, a [`Simctl`] wrapper, and an
//! output sink for the human-readable transcript. Each `check_*` method runs
//! one check, prints its status lines as it goes, and returns a
//! [`CheckReport`]. [`VerificationRunner::run`] strings the checks for a
//! [`Mode`] together into a [`RunSummary`].
//!
//! Nothing here returns an error. Missing files, failed or timed-out commands
//! and unexpected output all become failed checks with the cause printed.
//!
//! # Example
//!
//! ```no_run
//! use simverify_core::check::Mode;
//! use simverify_core::command::SystemRunner;
//! use simverify_core::config::VerifyConfig;
//! use simverify_core::runner::VerificationRunner;
//!
//! let mut runner = VerificationRunner::new(VerifyConfig::load(), SystemRunner, std::io::stdout());
//! let summary = runner.run(Mode::Complete);
//! std::process::exit(if summary.all_passed() { 0 } else { 1 });
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::assets::{discover_app_bundle, inspect_source_files, list_bundled_models};
use crate::check::{CheckKind, CheckReport, Mode, RunSummary};
use crate::command::CommandRunner;
use crate::config::VerifyConfig;
use crate::simctl::{Simctl, BOOTED};

const RULE_WIDTH: usize = 60;
/// Floor for a single process-listing poll near the launch deadline.
const MIN_PS_TIMEOUT: Duration = Duration::from_secs(1);

/// Status lines collected for one check.
struct Step {
    kind: CheckKind,
    lines: Vec<String>,
}

impl Step {
    fn new(kind: CheckKind) -> Self {
        Self {
            kind,
            lines: Vec::new(),
        }
    }

    fn finish(self, passed: bool) -> CheckReport {
        info!(check = ?self.kind, passed, "Check finished");
        CheckReport {
            kind: self.kind,
            passed,
            lines: self.lines,
        }
    }
}

/// Runs verification checks against one simulator and app.
pub struct VerificationRunner<R, W> {
    config: VerifyConfig,
    simctl: Simctl<R>,
    out: W,
}

impl<R: CommandRunner, W: Write> VerificationRunner<R, W> {
    /// Create a runner. Commands go through `runner`; the transcript is
    /// written to `out`.
    pub fn new(config: VerifyConfig, runner: R, out: W) -> Self {
        let simctl = Simctl::new(runner, config.command_timeout());
        Self {
            config,
            simctl,
            out,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Consume the runner and hand back the transcript sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Execute every check of `mode` in order and summarise.
    ///
    /// [`Mode::Basic`] stops after the first failed check and marks the
    /// summary as aborted. [`Mode::Complete`] always runs every check.
    pub fn run(&mut self, mode: Mode) -> RunSummary {
        let started = Instant::now();
        let mut summary = RunSummary::new(mode);
        info!(?mode, simulator = %self.config.simulator_id, bundle = %self.config.bundle_id, "Starting verification");

        let heading = match mode {
            Mode::Basic => "Smoke Test",
            Mode::Complete => "Complete Integration Test",
        };
        self.print(&format!("🧪 {} - {}", self.config.app_name, heading));
        self.print(&"=".repeat(RULE_WIDTH));

        let checks = mode.checks();
        for (index, kind) in checks.iter().copied().enumerate() {
            if index > 0 {
                self.print("");
            }
            self.print(&format!("{}  {}", keycap(index + 1), kind.title()));

            let report = self.run_check(kind, mode, &mut summary);
            let passed = report.passed;
            summary.record(report);

            if !passed && mode.stops_on_failure() && index + 1 < checks.len() {
                summary.aborted = true;
                break;
            }
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        self.print_summary(&summary);
        summary
    }

    fn run_check(&mut self, kind: CheckKind, mode: Mode, summary: &mut RunSummary) -> CheckReport {
        let simulator_id = self.config.simulator_id.clone();
        let bundle_id = self.config.bundle_id.clone();
        match kind {
            CheckKind::SourceFiles => {
                let paths = self.config.asset_paths();
                self.check_source_files(&paths, mode)
            }
            CheckKind::BundledAssets => {
                let app_path = self.config.app_path.clone();
                self.check_bundled_assets(app_path.as_deref())
            }
            CheckKind::SimulatorState => self.check_simulator_state(&simulator_id),
            CheckKind::Installed => self.check_installed(&simulator_id, &bundle_id),
            CheckKind::AppLaunch => {
                let (report, process_id) = self.check_app_launch(&simulator_id, &bundle_id);
                summary.process_id = process_id;
                report
            }
        }
    }

    /// Passes iff `simctl listapps` succeeds and its output contains
    /// `bundle_id`.
    pub fn check_installed(&mut self, simulator_id: &str, bundle_id: &str) -> CheckReport {
        let mut step = Step::new(CheckKind::Installed);
        let passed = match self.simctl.list_apps(simulator_id) {
            Ok(listing) if listing.contains(bundle_id) => {
                self.say(&mut step, "✅ App is installed on simulator");
                true
            }
            Ok(_) => {
                self.say(&mut step, format!("❌ {bundle_id} not found on simulator"));
                false
            }
            Err(e) => {
                self.say(&mut step, format!("❌ Could not verify app installation: {e}"));
                false
            }
        };
        step.finish(passed)
    }

    /// Checks that every expected asset file exists.
    ///
    /// In [`Mode::Basic`] the first missing file ends the check. In
    /// [`Mode::Complete`] every file is reported with its size.
    pub fn check_source_files(&mut self, paths: &[PathBuf], mode: Mode) -> CheckReport {
        let mut step = Step::new(CheckKind::SourceFiles);
        if paths.is_empty() {
            self.say(&mut step, "❌ No source model files configured");
            return step.finish(false);
        }
        let reports = inspect_source_files(paths, mode);

        for asset in &reports {
            let line = match (mode, asset.size_mb()) {
                (Mode::Basic, Some(_)) => format!("✅ {} file exists", asset.name),
                (Mode::Basic, None) => format!("❌ {} file missing", asset.name),
                (Mode::Complete, Some(mb)) => format!("✅ {}: {:.1} MB", asset.name, mb),
                (Mode::Complete, None) => format!("❌ {}: NOT FOUND", asset.name),
            };
            self.say(&mut step, line);
        }

        let all_present = reports.len() == paths.len() && reports.iter().all(|a| a.is_present());
        if all_present {
            self.say(&mut step, "✅ All source model files present");
        } else {
            self.say(&mut step, "❌ Missing source model files");
        }
        step.finish(all_present)
    }

    /// Checks that the built app carries its models directory.
    ///
    /// With `app_path` of `None` the app is located by searching DerivedData,
    /// then by asking simctl for the installed app's container.
    pub fn check_bundled_assets(&mut self, app_path: Option<&Path>) -> CheckReport {
        let mut step = Step::new(CheckKind::BundledAssets);

        let app = match app_path {
            Some(path) => Some(path.to_path_buf()),
            None => self.locate_app(&mut step),
        };
        let Some(app) = app else {
            self.say(&mut step, "❌ Built app not found; set app_path or build for the simulator");
            return step.finish(false);
        };

        let models_dir = app.join(&self.config.bundled_models_subdir);
        if !models_dir.is_dir() {
            self.say(
                &mut step,
                format!("❌ Bundled assets not found at {}", models_dir.display()),
            );
            return step.finish(false);
        }

        match list_bundled_models(&models_dir) {
            Ok(names) => self.say(&mut step, format!("✅ Bundled assets found: {names:?}")),
            Err(e) => self.say(
                &mut step,
                format!("✅ Bundled assets found (could not list contents: {e})"),
            ),
        }
        step.finish(true)
    }

    fn locate_app(&mut self, step: &mut Step) -> Option<PathBuf> {
        if let Some(derived) = self.config.derived_data_dir() {
            if let Some(app) = discover_app_bundle(&derived, &self.config.app_name) {
                self.say(step, format!("🔍 Found build at {}", app.display()));
                return Some(app);
            }
            debug!(derived = %derived.display(), "No DerivedData build found");
        }

        match self
            .simctl
            .app_container(&self.config.simulator_id, &self.config.bundle_id)
        {
            Ok(app) => {
                self.say(step, format!("🔍 Using installed app at {}", app.display()));
                Some(app)
            }
            Err(e) => {
                debug!(error = %e, "App container lookup failed");
                None
            }
        }
    }

    /// Passes immediately if the simulator is booted. Otherwise boots it,
    /// waits the boot settle delay, and passes iff the boot command
    /// succeeded. The state is not queried again after booting.
    pub fn check_simulator_state(&mut self, simulator_id: &str) -> CheckReport {
        let mut step = Step::new(CheckKind::SimulatorState);

        match self.simctl.device_state(simulator_id) {
            Ok(state) if state == BOOTED => {
                self.say(&mut step, "✅ Simulator is booted and ready");
                return step.finish(true);
            }
            Ok(state) => {
                self.say(&mut step, format!("⚠️  Simulator is {state}, attempting to boot..."));
            }
            Err(e) => {
                self.say(
                    &mut step,
                    format!("⚠️  Simulator not booted ({e}), attempting to boot..."),
                );
            }
        }

        let passed = match self.simctl.boot(simulator_id) {
            Ok(()) => {
                thread::sleep(self.config.boot_settle());
                self.say(&mut step, "✅ Simulator booted successfully");
                true
            }
            Err(e) => {
                self.say(&mut step, format!("❌ Failed to boot simulator: {e}"));
                false
            }
        };
        step.finish(passed)
    }

    /// Launches the app and passes iff the launch command succeeds.
    ///
    /// Afterwards the process table is watched for the app for up to the
    /// launch settle time. That observation is reported but does not change
    /// the outcome. Returns the process id simctl printed.
    pub fn check_app_launch(
        &mut self,
        simulator_id: &str,
        bundle_id: &str,
    ) -> (CheckReport, Option<String>) {
        let mut step = Step::new(CheckKind::AppLaunch);

        match self.simctl.launch(simulator_id, bundle_id) {
            Ok(process_id) => {
                self.say(&mut step, "✅ App launched successfully");
                self.say(&mut step, format!("📱 Process ID: {process_id}"));

                if self.wait_for_process(simulator_id) {
                    self.say(&mut step, "✅ App is running and stable");
                } else {
                    self.say(&mut step, "⚠️  App may have crashed or stopped");
                }
                (step.finish(true), Some(process_id))
            }
            Err(e) => {
                self.say(&mut step, format!("❌ App launch failed: {e}"));
                (step.finish(false), None)
            }
        }
    }

    /// Poll the simulator's process table until the app shows up or the
    /// launch settle deadline passes. Always polls at least once.
    fn wait_for_process(&self, simulator_id: &str) -> bool {
        let settle = self.config.launch_settle();
        let deadline = Instant::now().checked_add(settle);
        let process_name = &self.config.app_name;

        loop {
            let remaining = deadline.map_or(settle, |d| d.saturating_duration_since(Instant::now()));
            // A poll that starts at the deadline still gets a moment to answer.
            let limit = remaining.max(MIN_PS_TIMEOUT);
            match self.simctl.spawn_ps_within(simulator_id, limit) {
                Ok(ps) if !Simctl::<R>::find_process_lines(&ps, process_name).is_empty() => {
                    return true;
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Process listing failed"),
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!(process = %process_name, "App process not seen before deadline");
                        return false;
                    }
                    self.config.poll_interval().min(deadline - now)
                }
                None => self.config.poll_interval(),
            };
            thread::sleep(pause);
        }
    }

    fn print_summary(&mut self, summary: &RunSummary) {
        self.print("");
        self.print(&"=".repeat(RULE_WIDTH));
        self.print(&format!(
            "🏁 Test Results: {}/{} tests passed",
            summary.passed, summary.total
        ));

        if summary.all_passed() {
            self.print(&format!(
                "🎉 ALL TESTS PASSED! {} is ready on the simulator.",
                self.config.app_name
            ));
            if let Some(pid) = &summary.process_id {
                self.print(&format!("📱 The app is running in the simulator (pid {pid})."));
            }
        } else if summary.aborted {
            self.print("⚠️  Stopped at the first failed check. Please check the issue above.");
        } else {
            self.print(&format!(
                "⚠️  {} test(s) failed. Please check the issues above.",
                summary.failed()
            ));
        }
    }

    fn say(&mut self, step: &mut Step, text: impl Into<String>) {
        let text = text.into();
        self.print(&format!("   {text}"));
        step.lines.push(text);
    }

    fn print(&mut self, line: &str) {
        // A closed stdout must not turn into a failed run.
        let _ = writeln!(self.out, "{line}");
    }
}

/// Keycap emoji for a check number, e.g. `1️⃣`.
fn keycap(n: usize) -> String {
    format!("{n}\u{fe0f}\u{20e3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycap_digits() {
        assert_eq!(keycap(1), "1\u{fe0f}\u{20e3}");
        assert!(keycap(5).starts_with('5'));
    }
}
