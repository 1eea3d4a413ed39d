//! Platform provider interfaces.
//!
//! Native platform integrations (content resolvers, photo libraries,
//! package managers) are modeled as explicit trait interfaces, implemented
//! once per target platform and injected into the domain handlers. This
//! repository ships the generic host-level implementations it can
//! implement portably ([`HostDeviceProvider`], [`HostShellProvider`]) plus
//! [`UnsupportedProvider`] for the domains whose real backends (Android
//! package manager, contact/SMS content resolvers) are out of scope here —
//! a real platform build wires its own implementation in their place.
//! [`fakes`] supplies in-memory test doubles.

pub mod fakes;

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub model: String,
    pub os: String,
    pub firmware: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatteryInfo {
    pub level_percent: Option<u8>,
    pub charging: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkInterfaceInfo {
    pub name: String,
    pub ipv4: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageInfo {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// Providers for `device/*`. Implemented once per target platform; this
/// crate ships [`HostDeviceProvider`] as the portable, best-effort host
/// build — battery and screen are platform APIs with no generic host
/// equivalent and report as unavailable rather than faked.
pub trait DeviceProvider: Send + Sync {
    fn info(&self) -> DeviceInfo;
    fn battery(&self) -> BatteryInfo;
    fn network(&self) -> Vec<NetworkInterfaceInfo>;
    fn storage(&self, path: &std::path::Path) -> Result<StorageInfo, AgentError>;
    fn props(&self) -> HashMap<String, String>;
    fn permissions(&self) -> Vec<String>;
    /// PNG-encoded screen snapshot, where the platform supports it.
    fn screen(&self) -> Option<Vec<u8>>;
}

pub struct HostDeviceProvider;

impl DeviceProvider for HostDeviceProvider {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            model: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".to_string()),
            os: std::env::consts::OS.to_string(),
            firmware: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn battery(&self) -> BatteryInfo {
        BatteryInfo { level_percent: None, charging: None }
    }

    fn network(&self) -> Vec<NetworkInterfaceInfo> {
        Vec::new()
    }

    fn storage(&self, path: &std::path::Path) -> Result<StorageInfo, AgentError> {
        // std has no portable free-space API; report the existence check
        // only and leave sizing to a platform build with real syscalls.
        if !path.exists() {
            return Err(AgentError::NotFound(format!("{} does not exist", path.display())));
        }
        Ok(StorageInfo { total_bytes: 0, free_bytes: 0 })
    }

    fn props(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    fn permissions(&self) -> Vec<String> {
        Vec::new()
    }

    fn screen(&self) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppSummary {
    pub package_name: String,
    pub version_name: String,
    pub version_code: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDetail {
    pub package_name: String,
    pub version_name: String,
    pub version_code: u64,
    pub target_sdk: u32,
    pub apk_path: String,
    pub split_apk_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDataPath {
    pub package_name: String,
    pub path: String,
    pub size_bytes: u64,
}

pub trait AppsProvider: Send + Sync {
    fn list(&self) -> Vec<AppSummary>;
    fn info(&self, package_name: &str) -> Option<AppDetail>;
    fn data_paths(&self) -> Vec<AppDataPath>;
    fn install(&self, apk_path: &std::path::Path) -> Result<(), AgentError>;
    fn uninstall(&self, package_name: &str) -> Result<(), AgentError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Contact {
    pub name: String,
    pub phones: Vec<LabeledValue>,
    pub emails: Vec<LabeledValue>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
}

/// Per-entry result of a bulk import: failures are reported, never
/// silently swallowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ImportResult {
    pub success_count: usize,
    pub failures: Vec<String>,
}

pub trait ContactsProvider: Send + Sync {
    fn list(&self) -> Vec<Contact>;
    fn count(&self) -> usize;
    fn import(&self, contacts: Vec<Contact>) -> ImportResult;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmsMessage {
    pub thread_id: u64,
    pub address: String,
    pub body: String,
    pub timestamp_ms: u64,
    pub is_outgoing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub thread_id: u64,
    pub address: String,
    pub message_count: usize,
}

pub trait SmsProvider: Send + Sync {
    fn list(&self, page: usize, page_size: usize) -> Vec<SmsMessage>;
    fn all(&self) -> Vec<SmsMessage>;
    fn count(&self) -> usize;
    fn conversations(&self) -> Vec<Conversation>;
    fn import(&self, messages: Vec<SmsMessage>) -> ImportResult;
}

/// Shared "no platform backend wired" implementation for `AppsProvider`,
/// `ContactsProvider`, and `SmsProvider` on a generic host build.
pub struct UnsupportedProvider;

impl AppsProvider for UnsupportedProvider {
    fn list(&self) -> Vec<AppSummary> {
        Vec::new()
    }
    fn info(&self, _package_name: &str) -> Option<AppDetail> {
        None
    }
    fn data_paths(&self) -> Vec<AppDataPath> {
        Vec::new()
    }
    fn install(&self, _apk_path: &std::path::Path) -> Result<(), AgentError> {
        Err(AgentError::NotFound("no package manager provider configured on this build".to_string()))
    }
    fn uninstall(&self, _package_name: &str) -> Result<(), AgentError> {
        Err(AgentError::NotFound("no package manager provider configured on this build".to_string()))
    }
}

impl ContactsProvider for UnsupportedProvider {
    fn list(&self) -> Vec<Contact> {
        Vec::new()
    }
    fn count(&self) -> usize {
        0
    }
    fn import(&self, contacts: Vec<Contact>) -> ImportResult {
        ImportResult {
            success_count: 0,
            failures: contacts.iter().map(|c| format!("{}: no contacts provider configured", c.name)).collect(),
        }
    }
}

impl SmsProvider for UnsupportedProvider {
    fn list(&self, _page: usize, _page_size: usize) -> Vec<SmsMessage> {
        Vec::new()
    }
    fn all(&self) -> Vec<SmsMessage> {
        Vec::new()
    }
    fn count(&self) -> usize {
        0
    }
    fn conversations(&self) -> Vec<Conversation> {
        Vec::new()
    }
    fn import(&self, messages: Vec<SmsMessage>) -> ImportResult {
        ImportResult {
            success_count: 0,
            failures: messages.iter().map(|_| "no sms provider configured".to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// `shell/exec` and friends. The real work (spawning a process) is
/// platform-portable enough that this crate ships a real implementation
/// ([`HostShellProvider`]) rather than stubbing it out.
///
/// `exec` returns a boxed future (instead of an `async fn`) so the trait
/// stays object-safe and handlers can hold `Arc<dyn ShellProvider>`.
pub trait ShellProvider: Send + Sync {
    fn exec<'a>(
        &'a self,
        command: &'a str,
        deadline: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ShellResult, AgentError>> + Send + 'a>>;

    fn getprop(&self, key: &str) -> Option<String>;
}

pub struct HostShellProvider;

impl ShellProvider for HostShellProvider {
    fn exec<'a>(
        &'a self,
        command: &'a str,
        deadline: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ShellResult, AgentError>> + Send + 'a>> {
        Box::pin(async move {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd.stdout(std::process::Stdio::piped());
            cmd.stderr(std::process::Stdio::piped());

            let child = cmd.spawn().map_err(|e| AgentError::Internal(format!("spawn failed: {e}")))?;
            let output = tokio::time::timeout(deadline, child.wait_with_output())
                .await
                .map_err(|_| AgentError::ResourceExhausted("shell command exceeded its deadline".to_string()))?
                .map_err(|e| AgentError::Internal(format!("wait failed: {e}")))?;

            Ok(ShellResult {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            })
        })
    }

    fn getprop(&self, _key: &str) -> Option<String> {
        None
    }
}
