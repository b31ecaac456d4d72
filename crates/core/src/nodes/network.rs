//! Network diagnostics and temporary network settings
//!
//! Both nodes work on the shared [`NetworkConfig`] snapshot. Settings
//! changes are visible to every HTTP client built afterwards; the process
//! environment is never modified.

use crate::data::{NodeInputs, NodeOutput, UiPayload};
use crate::net::{NetworkConfig, SharedNetworkConfig};
use crate::nodes::node::{AsyncNode, AsyncNodeWrapper, Node, NodeFactory, SyncNode, SyncNodeWrapper};
use crate::nodes::schema::{DataKind, InputSpec, NodeSchema};
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

pub const DEBUG_NODE_TYPE: &str = "NetDebugNodeAny";
pub const SETTINGS_NODE_TYPE: &str = "TemporaryNetSettings";

const REPORT_HEADER: &str = "--- Network Diagnostics Report ---";
const REPORT_FOOTER: &str = "------------------------------------------------";
const GIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Render the diagnostics report
///
/// `git_config` holds the lines of `git config --global --list`; the git
/// section is omitted when it is `None`.
pub fn render_report(config: &NetworkConfig, git_config: Option<&[String]>) -> String {
    let mut lines = vec![REPORT_HEADER.to_string()];

    let proxies: Vec<String> = config
        .proxy_entries()
        .into_iter()
        .map(|(name, value)| format!("  - {}: {}", name, value))
        .collect();
    if proxies.is_empty() {
        lines.push("[Active Proxies (Environment)]: Direct/None".to_string());
    } else {
        lines.push(format!("[Active Proxies (Environment)]:\n{}", proxies.join("\n")));
    }

    let mut mirrors = Vec::new();
    if let Some(index) = &config.pip_index_url {
        mirrors.push(format!("  - PIP index: {}", index));
    }
    if let Some(proxy) = &config.pip_proxy {
        mirrors.push(format!("  - PIP proxy: {}", proxy));
    }
    match &config.hf_endpoint {
        Some(endpoint) => mirrors.push(format!("  - HF mirror: {}", endpoint)),
        None => mirrors.push("  - HF mirror: default (huggingface.co)".to_string()),
    }
    if let Some(gh) = &config.gh_proxy {
        mirrors.push(format!("  - Git/GH proxy: {}", gh));
    }
    lines.push(format!("[Mirrors / Accelerators]:\n{}", mirrors.join("\n")));

    if let Some(git_config) = git_config {
        let relevant: Vec<String> = git_config
            .iter()
            .map(|line| line.trim())
            .filter(|line| line.contains("url") || line.contains("proxy"))
            .map(|line| format!("  - {}", line))
            .collect();
        if relevant.is_empty() {
            lines.push("[Git Global Config]: None".to_string());
        } else {
            lines.push(format!("[Git Global Config]:\n{}", relevant.join("\n")));
        }
    }

    lines.push(REPORT_FOOTER.to_string());
    lines.join("\n")
}

/// Lines of `git config --global --list`, `None` if git is unavailable or slow
pub async fn git_global_config() -> Option<Vec<String>> {
    let output = Command::new("git")
        .args(["config", "--global", "--list"])
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(GIT_TIMEOUT, output).await {
        Ok(Ok(output)) if output.status.success() => Some(
            String::from_utf8_lossy(&output.stdout)
                .lines()
                .map(str::to_string)
                .collect(),
        ),
        Ok(Ok(output)) => {
            tracing::debug!(status = %output.status, "git config --global --list failed");
            None
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "git is not available");
            None
        }
        Err(_) => {
            tracing::debug!("git config --global --list timed out");
            None
        }
    }
}

/// Full diagnostics report including the git global configuration
pub async fn get_network_diagnostics(network: &SharedNetworkConfig) -> String {
    let git = git_global_config().await;
    let config = network.read().clone();
    render_report(&config, git.as_deref())
}

/// How a settings input changes a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingChange<'a> {
    /// Blank input: keep the current value
    Keep,
    /// "none" in any case: clear the value
    Clear,
    Set(&'a str),
}

impl<'a> SettingChange<'a> {
    pub fn parse(input: &'a str) -> Self {
        let value = input.trim();
        if value.is_empty() {
            SettingChange::Keep
        } else if value.eq_ignore_ascii_case("none") {
            SettingChange::Clear
        } else {
            SettingChange::Set(value)
        }
    }
}

/// Requested settings; empty strings keep the current values
#[derive(Debug, Clone, Default)]
pub struct NetSettingsRequest {
    pub http_proxy: String,
    pub pip_mirror: String,
    pub git_mirror: String,
    pub huggingface_mirror: String,
}

/// Apply `request` to `config`, returning one status line per setting
pub fn apply_settings(config: &mut NetworkConfig, request: &NetSettingsRequest) -> Vec<String> {
    let mut status = Vec::with_capacity(4);

    let proxy_line = match SettingChange::parse(&request.http_proxy) {
        SettingChange::Keep => keep_line("Proxy", config.http_proxy.as_deref()),
        SettingChange::Clear => {
            config.http_proxy = None;
            config.https_proxy = None;
            config.all_proxy = None;
            config.no_proxy = None;
            "[Proxy] Cleared".to_string()
        }
        SettingChange::Set(url) => {
            // no_proxy holds host lists, not URLs
            config.http_proxy = Some(url.to_string());
            config.https_proxy = Some(url.to_string());
            config.all_proxy = Some(url.to_string());
            format!("[Proxy] Set: {}", url)
        }
    };
    status.push(proxy_line);

    status.push(update_single("Pip Mirror", &mut config.pip_index_url, &request.pip_mirror));
    status.push(update_single("HF Mirror", &mut config.hf_endpoint, &request.huggingface_mirror));
    status.push(update_single("Git/GH Proxy", &mut config.gh_proxy, &request.git_mirror));
    status
}

fn update_single(label: &str, slot: &mut Option<String>, input: &str) -> String {
    match SettingChange::parse(input) {
        SettingChange::Keep => keep_line(label, slot.as_deref()),
        SettingChange::Clear => {
            *slot = None;
            format!("[{}] Cleared", label)
        }
        SettingChange::Set(value) => {
            *slot = Some(value.to_string());
            format!("[{}] Set: {}", label, value)
        }
    }
}

fn keep_line(label: &str, current: Option<&str>) -> String {
    format!("[{}] Keep: {}", label, current.unwrap_or("(Not Set)"))
}

/// Passes its input through and reports the network configuration
pub struct NetDebugNode {
    network: SharedNetworkConfig,
}

impl NetDebugNode {
    pub fn new(network: SharedNetworkConfig) -> Self {
        Self { network }
    }
}

#[async_trait::async_trait]
impl AsyncNode for NetDebugNode {
    fn node_type(&self) -> &str {
        DEBUG_NODE_TYPE
    }

    async fn process(&self, mut inputs: NodeInputs) -> Result<NodeOutput> {
        let report = get_network_diagnostics(&self.network).await;
        tracing::info!("Network snapshot\n{}", report);
        Ok(NodeOutput::single(inputs.take("any_input")).with_ui(UiPayload::text(report)))
    }
}

/// Updates the shared network configuration and passes its input through
pub struct NetSettingsNode {
    network: SharedNetworkConfig,
}

impl NetSettingsNode {
    pub fn new(network: SharedNetworkConfig) -> Self {
        Self { network }
    }
}

impl SyncNode for NetSettingsNode {
    fn node_type(&self) -> &str {
        SETTINGS_NODE_TYPE
    }

    fn process(&self, mut inputs: NodeInputs) -> Result<NodeOutput> {
        let request = NetSettingsRequest {
            http_proxy: inputs.text_or("http_proxy", "")?,
            pip_mirror: inputs.text_or("pip_mirror", "")?,
            git_mirror: inputs.text_or("git_mirror", "")?,
            huggingface_mirror: inputs.text_or("huggingface_mirror", "")?,
        };

        let status = {
            let mut config = self.network.write();
            apply_settings(&mut config, &request).join("\n")
        };
        tracing::info!("Network settings updated\n{}", status);

        Ok(NodeOutput::single(inputs.take("any_input")).with_ui(UiPayload::text(status)))
    }
}

pub struct NetDebugNodeFactory {
    network: SharedNetworkConfig,
}

impl NetDebugNodeFactory {
    pub fn new(network: SharedNetworkConfig) -> Self {
        Self { network }
    }
}

impl NodeFactory for NetDebugNodeFactory {
    fn node_type(&self) -> &str {
        DEBUG_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Network Diagnostics (CK)"
    }

    fn schema(&self) -> NodeSchema {
        NodeSchema::new(DEBUG_NODE_TYPE)
            .display_name(self.display_name())
            .description("Shows the current proxy and mirror settings")
            .function("do_debug")
            .input(InputSpec::required("any_input", DataKind::Any))
            .output("any_output", DataKind::Any)
            .output_node()
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        let node = NetDebugNode::new(Arc::clone(&self.network));
        Ok(Box::new(AsyncNodeWrapper(Arc::new(node))))
    }
}

pub struct NetSettingsNodeFactory {
    network: SharedNetworkConfig,
}

impl NetSettingsNodeFactory {
    pub fn new(network: SharedNetworkConfig) -> Self {
        Self { network }
    }
}

impl NodeFactory for NetSettingsNodeFactory {
    fn node_type(&self) -> &str {
        SETTINGS_NODE_TYPE
    }

    fn display_name(&self) -> &str {
        "Network Settings (CK)"
    }

    fn schema(&self) -> NodeSchema {
        let setting = |name: &str, tooltip: &str| {
            InputSpec::optional(name, DataKind::String)
                .default("")
                .tooltip(tooltip)
        };
        NodeSchema::new(SETTINGS_NODE_TYPE)
            .display_name(self.display_name())
            .description(
                "Temporarily changes network settings. 'None' clears a value (for the proxy \
                 also NO_PROXY), blank keeps it, anything else sets it.",
            )
            .function("apply_settings")
            .input(InputSpec::required("any_input", DataKind::Any))
            .input(setting("http_proxy", "e.g. http://127.0.0.1:7890 or None"))
            .input(setting("pip_mirror", "e.g. https://pypi.tuna.tsinghua.edu.cn/simple"))
            .input(setting("git_mirror", "e.g. https://ghproxy.com/"))
            .input(setting("huggingface_mirror", "e.g. https://hf-mirror.com"))
            .output("any_output", DataKind::Any)
            .output_node()
    }

    fn create(&self, _node_id: String, _params: &Value) -> Result<Box<dyn Node>> {
        let node = NetSettingsNode::new(Arc::clone(&self.network));
        Ok(Box::new(SyncNodeWrapper(node)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::RuntimeData;

    #[test]
    fn test_report_direct_connection() {
        let report = render_report(&NetworkConfig::default(), None);
        assert!(report.starts_with(REPORT_HEADER));
        assert!(report.contains("[Active Proxies (Environment)]: Direct/None"));
        assert!(report.contains("HF mirror: default (huggingface.co)"));
        assert!(!report.contains("Git Global Config"));
        assert!(report.ends_with(REPORT_FOOTER));
    }

    #[test]
    fn test_report_lists_proxies_mirrors_and_git() {
        let config = NetworkConfig {
            https_proxy: Some("http://p:1".into()),
            pip_index_url: Some("https://pypi.example/simple".into()),
            hf_endpoint: Some("https://hf-mirror.com".into()),
            gh_proxy: Some("https://gh.example/".into()),
            ..Default::default()
        };
        let git = vec![
            "user.name=someone".to_string(),
            "http.proxy=http://p:1".to_string(),
            "url.https://gh.example/.insteadof=https://github.com/".to_string(),
        ];
        let report = render_report(&config, Some(&git));
        assert!(report.contains("  - HTTPS_PROXY: http://p:1"));
        assert!(report.contains("  - PIP index: https://pypi.example/simple"));
        assert!(report.contains("  - HF mirror: https://hf-mirror.com"));
        assert!(report.contains("  - Git/GH proxy: https://gh.example/"));
        assert!(report.contains("  - http.proxy=http://p:1"));
        assert!(!report.contains("user.name"));
    }

    #[test]
    fn test_report_git_without_relevant_lines() {
        let report = render_report(&NetworkConfig::default(), Some(&["core.editor=vim".to_string()]));
        assert!(report.contains("[Git Global Config]: None"));
    }

    #[test]
    fn test_setting_change_parse() {
        assert_eq!(SettingChange::parse("   "), SettingChange::Keep);
        assert_eq!(SettingChange::parse("NoNe"), SettingChange::Clear);
        assert_eq!(SettingChange::parse(" http://x "), SettingChange::Set("http://x"));
    }

    #[test]
    fn test_set_proxy_leaves_no_proxy() {
        let mut config = NetworkConfig {
            no_proxy: Some("localhost".into()),
            ..Default::default()
        };
        let request = NetSettingsRequest {
            http_proxy: "http://127.0.0.1:7890".into(),
            ..Default::default()
        };
        let status = apply_settings(&mut config, &request);
        assert_eq!(status[0], "[Proxy] Set: http://127.0.0.1:7890");
        assert_eq!(config.all_proxy.as_deref(), Some("http://127.0.0.1:7890"));
        assert_eq!(config.no_proxy.as_deref(), Some("localhost"));
        assert_eq!(status[1], "[Pip Mirror] Keep: (Not Set)");
    }

    #[test]
    fn test_clear_proxy_also_clears_no_proxy() {
        let mut config = NetworkConfig {
            http_proxy: Some("http://a".into()),
            https_proxy: Some("http://a".into()),
            no_proxy: Some("localhost".into()),
            hf_endpoint: Some("https://hf-mirror.com".into()),
            ..Default::default()
        };
        let request = NetSettingsRequest {
            http_proxy: "None".into(),
            huggingface_mirror: "none".into(),
            ..Default::default()
        };
        let status = apply_settings(&mut config, &request);
        assert_eq!(status[0], "[Proxy] Cleared");
        assert_eq!(status[2], "[HF Mirror] Cleared");
        assert_eq!(config, NetworkConfig::default());
    }

    #[test]
    fn test_settings_node_updates_shared_config() {
        let network = NetworkConfig::default().into_shared();
        let node = NetSettingsNode::new(Arc::clone(&network));
        let inputs = NodeInputs::new()
            .with("any_input", 42i64)
            .with("git_mirror", "https://gh.example/");
        let output = node.process(inputs).unwrap();

        assert!(matches!(output.get(0), RuntimeData::Int(42)));
        assert_eq!(network.read().gh_proxy.as_deref(), Some("https://gh.example/"));
        let ui = output.ui.unwrap();
        assert!(ui.text[0].contains("[Git/GH Proxy] Set: https://gh.example/"));
    }

    #[tokio::test]
    async fn test_debug_node_passes_through() {
        let node = NetDebugNode::new(NetworkConfig::default().into_shared());
        let output = node
            .process(NodeInputs::new().with("any_input", "payload"))
            .await
            .unwrap();
        assert_eq!(output.get(0).as_text(), Some("payload"));
        assert!(output.ui.unwrap().text[0].starts_with(REPORT_HEADER));
    }
}
