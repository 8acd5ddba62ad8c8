//! Shared test helpers for simverify-core integration tests.
//!
//! Provides a scripted [`FakeRunner`] standing in for `xcrun simctl`, and an
//! on-disk fixture with model assets and a built app bundle.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use simverify_core::command::{CommandResult, CommandRunner};
use simverify_core::config::VerifyConfig;

pub const SIM_ID: &str = "0A6913C4-12DB-4112-AA76-B9E0753ED305";
pub const BUNDLE_ID: &str = "ai.delite.NimbleEdgeAssistant";

pub const LIST_DEVICES_JSON: &str = "xcrun simctl list devices -j";
pub const LIST_DEVICES_TEXT: &str = "xcrun simctl list devices";

pub fn list_apps() -> String {
    format!("xcrun simctl listapps {SIM_ID}")
}

pub fn boot() -> String {
    format!("xcrun simctl boot {SIM_ID}")
}

pub fn launch() -> String {
    format!("xcrun simctl launch {SIM_ID} {BUNDLE_ID}")
}

pub fn spawn_ps() -> String {
    format!("xcrun simctl spawn {SIM_ID} ps aux")
}

pub fn app_container() -> String {
    format!("xcrun simctl get_app_container {SIM_ID} {BUNDLE_ID} app")
}

// ---------------------------------------------------------------------------
// Scripted command runner
// ---------------------------------------------------------------------------

/// Answers commands from a table keyed by the full command line and records
/// every call. Unknown commands fail.
#[derive(Default)]
pub struct FakeRunner {
    responses: HashMap<String, CommandResult>,
    calls: RefCell<Vec<String>>,
    timeouts: RefCell<Vec<(String, Duration)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: impl Into<String>, result: CommandResult) -> Self {
        self.responses.insert(command.into(), result);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls.borrow().iter().filter(|c| *c == command).count()
    }

    /// Timeouts passed for every call of `command`, in call order.
    pub fn timeouts_for(&self, command: &str) -> Vec<Duration> {
        self.timeouts
            .borrow()
            .iter()
            .filter(|(line, _)| line == command)
            .map(|(_, timeout)| *timeout)
            .collect()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> CommandResult {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.borrow_mut().push(line.clone());
        self.timeouts.borrow_mut().push((line.clone(), timeout));
        self.responses
            .get(&line)
            .cloned()
            .unwrap_or_else(|| CommandResult::failure(format!("unexpected command: {line}")))
    }
}

pub fn devices_json(state: &str) -> String {
    format!(
        r#"{{
            "devices": {{
                "com.apple.CoreSimulator.SimRuntime.iOS-17-0": [
                    {{ "udid": "{SIM_ID}", "name": "iPhone 15 Pro", "state": "{state}" }},
                    {{ "udid": "B2C3D4E5-F6A7-8901-BCDE-F12345678901", "name": "iPhone 15", "state": "Booted" }}
                ]
            }}
        }}"#
    )
}

pub fn apps_listing(bundle_id: &str) -> String {
    format!(
        r#"{{
    "com.apple.mobilesafari" =     {{
        CFBundleIdentifier = "com.apple.mobilesafari";
    }};
    "{bundle_id}" =     {{
        CFBundleIdentifier = "{bundle_id}";
        CFBundleName = NimbleEdgeAssistant;
    }};
}}"#
    )
}

pub const PS_WITH_APP: &str = "USER PID COMMAND
mobile 1234 /private/var/containers/Bundle/Application/X/NimbleEdgeAssistant.app/NimbleEdgeAssistant
mobile 88 /usr/libexec/backboardd
";

/// Every simctl command answering the way a healthy, booted deployment does.
pub fn healthy_runner() -> FakeRunner {
    FakeRunner::new()
        .respond(LIST_DEVICES_JSON, CommandResult::ok(devices_json("Booted")))
        .respond(list_apps(), CommandResult::ok(apps_listing(BUNDLE_ID)))
        .respond(launch(), CommandResult::ok(format!("{BUNDLE_ID}: 1234\n")))
        .respond(spawn_ps(), CommandResult::ok(PS_WITH_APP))
}

// ---------------------------------------------------------------------------
// Filesystem fixture
// ---------------------------------------------------------------------------

pub const ASSET_FILES: [&str; 5] = ["model", "tokenizer", "config", "vocab", "merges"];

pub struct Fixture {
    pub dir: TempDir,
    pub config: VerifyConfig,
}

impl Fixture {
    pub fn assets_dir(&self) -> PathBuf {
        self.dir.path().join("assets")
    }

    pub fn app_dir(&self) -> PathBuf {
        self.dir.path().join("NimbleEdgeAssistant.app")
    }

    pub fn remove_asset(&self, name: &str) {
        fs::remove_file(self.assets_dir().join(name)).unwrap();
    }
}

/// Five non-empty asset files, a built app with `Models/llama3`, an empty
/// DerivedData root, and zero settle delays.
pub fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();

    let assets = dir.path().join("assets");
    fs::create_dir_all(&assets).unwrap();
    for (i, name) in ASSET_FILES.iter().enumerate() {
        fs::write(assets.join(name), vec![1u8; 1024 * (i + 1)]).unwrap();
    }

    let app = dir.path().join("NimbleEdgeAssistant.app");
    let bundled = app.join("Models/llama3");
    fs::create_dir_all(&bundled).unwrap();
    for name in ASSET_FILES {
        fs::write(bundled.join(name), b"x").unwrap();
    }

    let derived = dir.path().join("DerivedData");
    fs::create_dir_all(&derived).unwrap();

    let config = VerifyConfig {
        simulator_id: SIM_ID.to_string(),
        bundle_id: BUNDLE_ID.to_string(),
        assets_dir: assets,
        app_path: Some(app),
        derived_data_dir: Some(derived),
        command_timeout_secs: 5,
        boot_settle_ms: 0,
        launch_settle_ms: 0,
        poll_interval_ms: 0,
        ..Default::default()
    };

    Fixture { dir, config }
}
