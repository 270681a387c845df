use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `[api]` block: where the analytics backend lives and how to authenticate.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
}

/// `[session]` block: the resolved role and client from the (out-of-scope)
/// auth layer. Read-only here — this subsystem never decides roles.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct SessionConfig {
    pub client_id: Option<String>,
    #[serde(default)]
    pub admin: bool,
}

/// `[dashboard]` block: refresh cadence and display timezone override.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct DashboardConfig {
    pub refresh_minutes: Option<f64>,
    /// IANA zone name, e.g. "America/New_York". Overrides TZ/system zone.
    pub timezone: Option<String>,
}

/// Top-level dispo config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct DispoConfig {
    pub api: Option<ApiConfig>,
    pub session: Option<SessionConfig>,
    pub dashboard: Option<DashboardConfig>,
}

impl DispoConfig {
    /// Load config from ~/.dispo/config.toml. Returns default if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(DispoConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: DispoConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
        Ok(config)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.session.as_ref()?.client_id.as_deref()
    }

    pub fn is_admin(&self) -> bool {
        self.session.as_ref().map(|s| s.admin).unwrap_or(false)
    }

    pub fn refresh_minutes(&self) -> f64 {
        self.dashboard
            .as_ref()
            .and_then(|d| d.refresh_minutes)
            .unwrap_or(5.0)
    }

    pub fn timezone_override(&self) -> Option<&str> {
        self.dashboard.as_ref()?.timezone.as_deref()
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref api) = self.api {
            lines.push("[api]".to_string());
            if let Some(ref url) = api.base_url {
                lines.push(format!("  base_url = \"{}\"", url));
            }
            if let Some(ref key) = api.api_key {
                let redacted = if key.len() > 8 {
                    format!("{}...{}", &key[..4], &key[key.len() - 4..])
                } else {
                    "****".to_string()
                };
                lines.push(format!("  api_key = \"{}\"", redacted));
            }
            if let Some(ref cmd) = api.api_key_command {
                lines.push(format!("  api_key_command = \"{}\"", cmd));
            }
        }
        if let Some(ref session) = self.session {
            lines.push("[session]".to_string());
            if let Some(ref id) = session.client_id {
                lines.push(format!("  client_id = \"{}\"", id));
            }
            lines.push(format!("  admin = {}", session.admin));
        }
        if let Some(ref dash) = self.dashboard {
            lines.push("[dashboard]".to_string());
            if let Some(mins) = dash.refresh_minutes {
                lines.push(format!("  refresh_minutes = {}", mins));
            }
            if let Some(ref tz) = dash.timezone {
                lines.push(format!("  timezone = \"{}\"", tz));
            }
        }
        if lines.is_empty() {
            lines.push("(empty config)".to_string());
        }
        lines.join("\n")
    }
}

/// Resolve the API credential through the chain: CLI flag > env var > config key > config command.
pub fn resolve_credential(
    cli_flag: Option<&str>,
    env_var_name: &str,
    config: Option<&ApiConfig>,
) -> Result<String> {
    // 1. CLI flag
    if let Some(key) = cli_flag {
        if !key.is_empty() {
            return Ok(key.to_string());
        }
    }

    // 2. Environment variable
    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(val);
        }
    }

    if let Some(api) = config {
        // 3. Config file api_key
        if let Some(ref key) = api.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }

        // 4. External command
        if let Some(ref cmd) = api.api_key_command {
            if !cmd.is_empty() {
                let output = std::process::Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    bail!(
                        "api_key_command failed (exit {}): {}",
                        output.status.code().unwrap_or(-1),
                        stderr.trim()
                    );
                }

                let secret = String::from_utf8(output.stdout)
                    .context("api_key_command output is not valid UTF-8")?
                    .trim()
                    .to_string();

                if !secret.is_empty() {
                    return Ok(secret);
                }
            }
        }
    }

    bail!(
        "No API key found. Provide via --api-key, {} env var, or ~/.dispo/config.toml",
        env_var_name
    );
}

/// Path to the config file: ~/.dispo/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".dispo").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.dispo/config.toml
# Credential resolution order: CLI flag > DISPO_API_KEY env var > api_key > api_key_command

[api]
# base_url = "https://analytics.example.com/api"
# api_key = "your-api-key"
# api_key_command = "your-secrets-manager-command-here"

[session]
# client_id = "your-client-id"
# admin = false

[dashboard]
# refresh_minutes = 5.0
# timezone = "America/New_York"
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_parses_back_as_config() {
        // Uncommented template fields must round-trip through toml.
        let filled = default_config_template().replace("# ", "");
        let config: DispoConfig = toml::from_str(&filled).unwrap();
        assert_eq!(
            config.api.as_ref().unwrap().base_url.as_deref(),
            Some("https://analytics.example.com/api")
        );
        assert!(!config.is_admin());
        assert_eq!(config.refresh_minutes(), 5.0);
        assert_eq!(config.timezone_override(), Some("America/New_York"));
    }

    #[test]
    fn credential_chain_prefers_flag_over_config() {
        let api = ApiConfig {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        let key =
            resolve_credential(Some("from-flag"), "DISPO_TEST_KEY_UNSET", Some(&api)).unwrap();
        assert_eq!(key, "from-flag");
    }

    #[test]
    fn credential_chain_falls_back_to_config_key() {
        let api = ApiConfig {
            api_key: Some("from-config".into()),
            ..Default::default()
        };
        let key = resolve_credential(None, "DISPO_TEST_KEY_UNSET", Some(&api)).unwrap();
        assert_eq!(key, "from-config");
    }

    #[test]
    fn missing_credential_is_an_error() {
        assert!(resolve_credential(None, "DISPO_TEST_KEY_UNSET", None).is_err());
    }

    #[test]
    fn redacted_display_hides_key_middle() {
        let config = DispoConfig {
            api: Some(ApiConfig {
                base_url: Some("https://x".into()),
                api_key: Some("secret-key-123456".into()),
                api_key_command: None,
            }),
            session: None,
            dashboard: None,
        };
        let shown = config.display_redacted();
        assert!(shown.contains("secr...3456"));
        assert!(!shown.contains("secret-key-123456"));
    }
}
