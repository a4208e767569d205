use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;


/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

/// Terminal host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell used to run agent commands
    pub shell: String,
    /// Working directory for agent commands (defaults to the session cwd)
    pub working_dir: Option<String>,
}

/// Agent loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Wall-clock timeout for a single agent-dispatched command
    pub command_timeout_seconds: u64,
    /// Retry attempts for a failing model call before giving up
    pub max_retry_attempts: u32,
    /// Cap on model output per completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature for model calls
    pub temperature: Option<f32>,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
            working_dir: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command_timeout_seconds: 120,
            max_retry_attempts: 3,
            max_tokens: Some(4096),
            temperature: Some(0.1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            terminal: TerminalConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        // Check if any config file exists
        let config_exists = if let Some(path) = config_path {
            Path::new(path).exists()
        } else {
            Self::default_paths().iter().any(|path| {
                let expanded_path = shellexpand::tilde(path);
                Path::new(expanded_path.as_ref()).exists()
            })
        };

        // If no config exists, create and save a default config
        if !config_exists {
            let default_config = Self::default();

            let config_dir = dirs::home_dir()
                .map(|mut path| {
                    path.push(".config");
                    path.push("termpilot");
                    path
                })
                .unwrap_or_else(|| std::path::PathBuf::from("."));

            std::fs::create_dir_all(&config_dir).ok();

            let config_file = config_dir.join("config.toml");
            if let Some(path_str) = config_file.to_str() {
                if let Err(e) = default_config.save(path_str) {
                    eprintln!("Warning: Could not save default config: {}", e);
                }
            }

            return Ok(default_config);
        }

        // Load config from file
        let config_path_to_load = if let Some(path) = config_path {
            Some(path.to_string())
        } else {
            Self::default_paths().iter().find_map(|path| {
                let expanded_path = shellexpand::tilde(path);
                if Path::new(expanded_path.as_ref()).exists() {
                    Some(expanded_path.to_string())
                } else {
                    None
                }
            })
        };

        if let Some(path) = config_path_to_load {
            let config_content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&config_content)?;
            config.validate()?;
            return Ok(config);
        }

        Ok(Self::default())
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn default_paths() -> [&'static str; 2] {
        ["./termpilot.toml", "~/.config/termpilot/config.toml"]
    }

    fn validate(&self) -> Result<()> {
        if self.terminal.shell.trim().is_empty() {
            anyhow::bail!("terminal.shell must not be empty");
        }
        if self.agent.command_timeout_seconds == 0 {
            anyhow::bail!("agent.command_timeout_seconds must be at least 1");
        }
        Ok(())
    }
}
