//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! [`Simctl`] wraps the handful of simulator operations the verification run
//! needs: listing devices and installed apps, booting, launching, inspecting
//! the process table, and locating an installed app's bundle. Every call goes
//! through a [`CommandRunner`] with a per-command timeout.
//!
//! Device state is read from the structured `list devices -j` output when
//! possible. The plain-text listing is kept as a fallback and searched by
//! substring, which is how older tooling consumed it.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use simverify_core::command::SystemRunner;
//! use simverify_core::simctl::Simctl;
//!
//! let simctl = Simctl::new(SystemRunner, Duration::from_secs(30));
//! for device in simctl.list_devices().unwrap() {
//!     println!("{}: {} ({})", device.name, device.udid, device.state);
//! }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::command::{CommandResult, CommandRunner};

/// State string simctl reports for a running simulator.
pub const BOOTED: &str = "Booted";

/// Errors that can occur when interacting with simctl.
#[derive(Error, Debug)]
pub enum SimctlError {
    /// A simctl command exited unsuccessfully.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// A simctl command did not finish within its timeout.
    #[error("Command timed out")]
    Timeout,

    /// No simulator with the given UDID appears in the device list.
    #[error("Simulator not found: {0}")]
    DeviceNotFound(String),

    /// Failed to parse JSON output from simctl.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// simctl succeeded but printed something we could not interpret.
    #[error("Unexpected simctl output: {0}")]
    UnexpectedOutput(String),
}

impl From<CommandResult> for SimctlError {
    fn from(result: CommandResult) -> Self {
        if result.is_timeout() {
            SimctlError::Timeout
        } else {
            SimctlError::CommandFailed(result.stderr.trim().to_string())
        }
    }
}

/// Represents an iOS Simulator device.
///
/// This struct contains information about a simulator device as reported
/// by `xcrun simctl list devices -j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorDevice {
    /// The unique device identifier (UDID) for this simulator.
    pub udid: String,

    /// The human-readable name of the device (e.g., "iPhone 15 Pro").
    pub name: String,

    /// The current state of the device (e.g., "Booted", "Shutdown").
    pub state: String,

    /// The device type identifier (e.g., "com.apple.CoreSimulator.SimDeviceType.iPhone-15-Pro").
    #[serde(rename = "deviceTypeIdentifier")]
    pub device_type: Option<String>,
}

impl SimulatorDevice {
    pub fn is_booted(&self) -> bool {
        self.state == BOOTED
    }
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: HashMap<String, Vec<SimulatorDevice>>,
}

/// Wrapper for `xcrun simctl` commands.
///
/// All methods are synchronous and block until the command exits or its
/// timeout elapses.
pub struct Simctl<R> {
    runner: R,
    timeout: Duration,
}

impl<R: CommandRunner> Simctl<R> {
    /// Create a wrapper that runs every command with the given timeout.
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    fn simctl(&self, args: &[&str]) -> CommandResult {
        self.simctl_within(args, self.timeout)
    }

    fn simctl_within(&self, args: &[&str], timeout: Duration) -> CommandResult {
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push("simctl");
        full.extend_from_slice(args);
        self.runner.run("xcrun", &full, timeout)
    }

    fn simctl_checked(&self, args: &[&str]) -> Result<String, SimctlError> {
        Self::checked(self.simctl(args))
    }

    fn checked(result: CommandResult) -> Result<String, SimctlError> {
        if result.success {
            Ok(result.stdout)
        } else {
            Err(result.into())
        }
    }

    /// Raw output of `simctl listapps <udid>`.
    pub fn list_apps(&self, udid: &str) -> Result<String, SimctlError> {
        self.simctl_checked(&["listapps", udid])
    }

    /// Lists all simulator devices across every installed runtime.
    ///
    /// # Errors
    ///
    /// - [`SimctlError::CommandFailed`] or [`SimctlError::Timeout`] if the command fails
    /// - [`SimctlError::JsonParse`] if the output cannot be parsed as JSON
    pub fn list_devices(&self) -> Result<Vec<SimulatorDevice>, SimctlError> {
        let stdout = self.simctl_checked(&["list", "devices", "-j"])?;
        Self::parse_device_list(stdout.as_bytes())
    }

    /// Raw output of the human-readable `simctl list devices`.
    pub fn list_devices_text(&self) -> Result<String, SimctlError> {
        self.simctl_checked(&["list", "devices"])
    }

    /// Current state of the simulator with the given UDID.
    ///
    /// Tries the JSON listing first. If that command fails or its output does
    /// not parse, falls back to scanning the text listing for the UDID's line.
    ///
    /// # Errors
    ///
    /// - [`SimctlError::DeviceNotFound`] if neither listing mentions the UDID
    /// - Command errors from the text listing when both listings fail
    pub fn device_state(&self, udid: &str) -> Result<String, SimctlError> {
        match self.list_devices() {
            Ok(devices) => Self::find_device(&devices, udid)
                .map(|d| d.state.clone())
                .ok_or_else(|| SimctlError::DeviceNotFound(udid.to_string())),
            Err(e) => {
                debug!(error = %e, "JSON device listing unavailable, falling back to text");
                let text = self.list_devices_text()?;
                Self::text_state_for(&text, udid)
                    .ok_or_else(|| SimctlError::DeviceNotFound(udid.to_string()))
            }
        }
    }

    /// Boots a simulator device.
    ///
    /// Any non-zero exit is an error, including simctl's "current state:
    /// Booted" refusal.
    pub fn boot(&self, udid: &str) -> Result<(), SimctlError> {
        self.simctl_checked(&["boot", udid]).map(|_| ())
    }

    /// Launches an installed app and returns the process id simctl reports.
    pub fn launch(&self, udid: &str, bundle_id: &str) -> Result<String, SimctlError> {
        let stdout = self.simctl_checked(&["launch", udid, bundle_id])?;
        Ok(Self::parse_launch_pid(&stdout))
    }

    /// Process table of the simulator, via `simctl spawn <udid> ps aux`.
    pub fn spawn_ps(&self, udid: &str) -> Result<String, SimctlError> {
        self.spawn_ps_within(udid, self.timeout)
    }

    /// Like [`Self::spawn_ps`], but never waits longer than `limit` or the
    /// configured command timeout, whichever is shorter.
    pub fn spawn_ps_within(&self, udid: &str, limit: Duration) -> Result<String, SimctlError> {
        let timeout = self.timeout.min(limit);
        Self::checked(self.simctl_within(&["spawn", udid, "ps", "aux"], timeout))
    }

    /// Filesystem path of an installed app's `.app` bundle.
    pub fn app_container(&self, udid: &str, bundle_id: &str) -> Result<PathBuf, SimctlError> {
        let stdout = self.simctl_checked(&["get_app_container", udid, bundle_id, "app"])?;
        let path = stdout.trim();
        if path.is_empty() {
            return Err(SimctlError::UnexpectedOutput(
                "empty app container path".to_string(),
            ));
        }
        Ok(PathBuf::from(path))
    }

    /// Parses device list JSON into a flat vector of devices.
    ///
    /// # Errors
    ///
    /// - [`SimctlError::JsonParse`] if the JSON is invalid or has unexpected structure
    pub fn parse_device_list(json: &[u8]) -> Result<Vec<SimulatorDevice>, SimctlError> {
        let device_list: DeviceList = serde_json::from_slice(json)?;
        Ok(device_list.devices.into_values().flatten().collect())
    }

    /// Finds the device with the given UDID.
    pub fn find_device<'a>(devices: &'a [SimulatorDevice], udid: &str) -> Option<&'a SimulatorDevice> {
        devices.iter().find(|d| d.udid == udid)
    }

    /// Reads a device's state out of the text listing.
    ///
    /// A line mentioning the UDID and containing `Booted` anywhere counts as
    /// booted. Otherwise the last parenthesised token on the line is taken as
    /// the state, e.g. `iPhone 15 (UDID) (Shutdown)`.
    pub fn text_state_for(listing: &str, udid: &str) -> Option<String> {
        let line = listing.lines().find(|line| line.contains(udid))?;
        if line.contains(BOOTED) {
            return Some(BOOTED.to_string());
        }
        let state = line
            .rsplit_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(state, _)| state.trim())
            .filter(|state| !state.is_empty() && *state != udid)
            .unwrap_or("Unknown");
        Some(state.to_string())
    }

    /// Process id from `simctl launch` output such as `com.example.app: 1234`.
    ///
    /// Takes whatever follows the last colon, trimmed. Output without a colon
    /// is returned trimmed as-is.
    pub fn parse_launch_pid(stdout: &str) -> String {
        stdout
            .trim()
            .rsplit(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Lines of `ps aux` output that mention `process_name`, ignoring any
    /// `grep` invocations.
    pub fn find_process_lines<'a>(ps_output: &'a str, process_name: &str) -> Vec<&'a str> {
        ps_output
            .lines()
            .filter(|line| line.contains(process_name) && !line.contains("grep"))
            .collect()
    }
}
