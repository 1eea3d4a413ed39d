//! In-memory test doubles for the platform provider traits, used by the
//! domain handler unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{
    AppDataPath, AppDetail, AppSummary, AppsProvider, BatteryInfo, Contact, ContactsProvider,
    Conversation, DeviceInfo, DeviceProvider, ImportResult, NetworkInterfaceInfo, ShellProvider,
    ShellResult, SmsMessage, SmsProvider, StorageInfo,
};
use crate::error::AgentError;

pub struct FakeDeviceProvider {
    pub info: DeviceInfo,
    pub battery: BatteryInfo,
    pub network: Vec<NetworkInterfaceInfo>,
    pub storage: StorageInfo,
    pub props: HashMap<String, String>,
}

impl Default for FakeDeviceProvider {
    fn default() -> Self {
        Self {
            info: DeviceInfo {
                model: "Test Phone".to_string(),
                os: "test-os".to_string(),
                firmware: "1.0.0".to_string(),
            },
            battery: BatteryInfo { level_percent: Some(80), charging: Some(false) },
            network: vec![NetworkInterfaceInfo { name: "wlan0".to_string(), ipv4: vec!["192.168.1.50".to_string()] }],
            storage: StorageInfo { total_bytes: 64_000_000_000, free_bytes: 32_000_000_000 },
            props: HashMap::new(),
        }
    }
}

impl DeviceProvider for FakeDeviceProvider {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }
    fn battery(&self) -> BatteryInfo {
        self.battery.clone()
    }
    fn network(&self) -> Vec<NetworkInterfaceInfo> {
        self.network.clone()
    }
    fn storage(&self, _path: &std::path::Path) -> Result<StorageInfo, AgentError> {
        Ok(self.storage.clone())
    }
    fn props(&self) -> HashMap<String, String> {
        self.props.clone()
    }
    fn permissions(&self) -> Vec<String> {
        vec!["android.permission.READ_CONTACTS".to_string()]
    }
    fn screen(&self) -> Option<Vec<u8>> {
        None
    }
}

#[derive(Default)]
pub struct FakeAppsProvider {
    pub apps: Mutex<Vec<AppDetail>>,
}

impl AppsProvider for FakeAppsProvider {
    fn list(&self) -> Vec<AppSummary> {
        self.apps
            .lock()
            .unwrap()
            .iter()
            .map(|a| AppSummary {
                package_name: a.package_name.clone(),
                version_name: a.version_name.clone(),
                version_code: a.version_code,
            })
            .collect()
    }
    fn info(&self, package_name: &str) -> Option<AppDetail> {
        self.apps.lock().unwrap().iter().find(|a| a.package_name == package_name).cloned()
    }
    fn data_paths(&self) -> Vec<AppDataPath> {
        self.apps
            .lock()
            .unwrap()
            .iter()
            .map(|a| AppDataPath { package_name: a.package_name.clone(), path: format!("/data/data/{}", a.package_name), size_bytes: 1024 })
            .collect()
    }
    fn install(&self, apk_path: &std::path::Path) -> Result<(), AgentError> {
        self.apps.lock().unwrap().push(AppDetail {
            package_name: apk_path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string(),
            version_name: "1.0".to_string(),
            version_code: 1,
            target_sdk: 34,
            apk_path: apk_path.display().to_string(),
            split_apk_paths: Vec::new(),
        });
        Ok(())
    }
    fn uninstall(&self, package_name: &str) -> Result<(), AgentError> {
        let mut apps = self.apps.lock().unwrap();
        let before = apps.len();
        apps.retain(|a| a.package_name != package_name);
        if apps.len() == before {
            return Err(AgentError::NotFound(format!("package {package_name} not installed")));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeContactsProvider {
    pub contacts: Mutex<Vec<Contact>>,
}

impl ContactsProvider for FakeContactsProvider {
    fn list(&self) -> Vec<Contact> {
        self.contacts.lock().unwrap().clone()
    }
    fn count(&self) -> usize {
        self.contacts.lock().unwrap().len()
    }
    fn import(&self, contacts: Vec<Contact>) -> ImportResult {
        let mut store = self.contacts.lock().unwrap();
        let mut result = ImportResult::default();
        for contact in contacts {
            if contact.name.is_empty() {
                result.failures.push("contact missing a name".to_string());
                continue;
            }
            store.push(contact);
            result.success_count += 1;
        }
        result
    }
}

#[derive(Default)]
pub struct FakeSmsProvider {
    pub messages: Mutex<Vec<SmsMessage>>,
}

impl SmsProvider for FakeSmsProvider {
    fn list(&self, page: usize, page_size: usize) -> Vec<SmsMessage> {
        self.messages.lock().unwrap().iter().skip(page * page_size).take(page_size).cloned().collect()
    }
    fn all(&self) -> Vec<SmsMessage> {
        self.messages.lock().unwrap().clone()
    }
    fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
    fn conversations(&self) -> Vec<Conversation> {
        let messages = self.messages.lock().unwrap();
        let mut threads: HashMap<u64, (String, usize)> = HashMap::new();
        for m in messages.iter() {
            let entry = threads.entry(m.thread_id).or_insert((m.address.clone(), 0));
            entry.1 += 1;
        }
        threads
            .into_iter()
            .map(|(thread_id, (address, message_count))| Conversation { thread_id, address, message_count })
            .collect()
    }
    fn import(&self, messages: Vec<SmsMessage>) -> ImportResult {
        let mut store = self.messages.lock().unwrap();
        let mut result = ImportResult::default();
        for m in messages {
            if m.address.is_empty() {
                result.failures.push("message missing an address".to_string());
                continue;
            }
            store.push(m);
            result.success_count += 1;
        }
        result
    }
}

pub struct FakeShellProvider {
    pub exit_code: i32,
    pub stdout: String,
}

impl Default for FakeShellProvider {
    fn default() -> Self {
        Self { exit_code: 0, stdout: "ok".to_string() }
    }
}

impl ShellProvider for FakeShellProvider {
    fn exec<'a>(
        &'a self,
        command: &'a str,
        _deadline: Duration,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<ShellResult, AgentError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(ShellResult {
                stdout: format!("{}: {}", self.stdout, command),
                stderr: String::new(),
                exit_code: self.exit_code,
            })
        })
    }

    fn getprop(&self, key: &str) -> Option<String> {
        (key == "ro.product.model").then(|| "Test Phone".to_string())
    }
}
