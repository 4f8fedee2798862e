//! Briefflow configuration (`briefflow.toml`)

use crate::orchestrator::GenerationCall;
use crate::workflow::GuardMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name, relative to the project root
pub const CONFIG_FILE: &str = "briefflow.toml";

// =============================================================================
// Storage
// =============================================================================

/// Where and how sessions are persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Storage directory (relative paths resolve against the project root)
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,

    /// Session scope; each session gets its own record
    #[serde(default = "default_session")]
    pub session: String,

    /// Keep the record after the render is dispatched
    #[serde(default)]
    pub retain_on_complete: bool,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".briefflow")
}

fn default_session() -> String {
    "default".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_storage_dir(),
            session: default_session(),
            retain_on_complete: false,
        }
    }
}

impl StorageConfig {
    /// Absolute storage directory for a project
    pub fn resolve_dir(&self, project_root: &Path) -> PathBuf {
        if self.dir.is_absolute() {
            self.dir.clone()
        } else {
            project_root.join(&self.dir)
        }
    }
}

// =============================================================================
// Reset guard
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GuardConfig {
    #[serde(default)]
    pub mode: GuardMode,
}

// =============================================================================
// Timeouts
// =============================================================================

/// Maximum wait window per generation call, in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutConfig {
    #[serde(default = "default_parse_brief_secs")]
    pub parse_brief: u64,
    #[serde(default = "default_motivations_secs")]
    pub generate_motivations: u64,
    #[serde(default = "default_copy_secs")]
    pub generate_copy: u64,
    #[serde(default = "default_assets_secs")]
    pub generate_assets: u64,
    #[serde(default = "default_templates_secs")]
    pub select_templates: u64,
    #[serde(default = "default_matrix_secs")]
    pub build_matrix: u64,
}

fn default_parse_brief_secs() -> u64 {
    120
}

fn default_motivations_secs() -> u64 {
    60
}

fn default_copy_secs() -> u64 {
    30
}

fn default_assets_secs() -> u64 {
    300
}

fn default_templates_secs() -> u64 {
    30
}

fn default_matrix_secs() -> u64 {
    60
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            parse_brief: default_parse_brief_secs(),
            generate_motivations: default_motivations_secs(),
            generate_copy: default_copy_secs(),
            generate_assets: default_assets_secs(),
            select_templates: default_templates_secs(),
            build_matrix: default_matrix_secs(),
        }
    }
}

impl TimeoutConfig {
    /// Wait window for a call
    pub fn window(&self, call: GenerationCall) -> Duration {
        let secs = match call {
            GenerationCall::ParseBrief => self.parse_brief,
            GenerationCall::GenerateMotivations => self.generate_motivations,
            GenerationCall::GenerateCopy => self.generate_copy,
            GenerationCall::GenerateAssets => self.generate_assets,
            GenerationCall::SelectTemplates => self.select_templates,
            GenerationCall::BuildMatrix => self.build_matrix,
        };
        Duration::from_secs(secs)
    }
}

// =============================================================================
// Generator
// =============================================================================

/// Which collaborator implementation serves generation calls
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    #[default]
    Script,
    Http,
}

/// Command line (argv) per generation call for the script generator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptCommands {
    #[serde(default)]
    pub parse_brief: Vec<String>,
    #[serde(default)]
    pub generate_motivations: Vec<String>,
    #[serde(default)]
    pub generate_copy: Vec<String>,
    #[serde(default)]
    pub generate_assets: Vec<String>,
    #[serde(default)]
    pub select_templates: Vec<String>,
    #[serde(default)]
    pub build_matrix: Vec<String>,
}

impl ScriptCommands {
    pub fn argv(&self, call: GenerationCall) -> &[String] {
        match call {
            GenerationCall::ParseBrief => &self.parse_brief,
            GenerationCall::GenerateMotivations => &self.generate_motivations,
            GenerationCall::GenerateCopy => &self.generate_copy,
            GenerationCall::GenerateAssets => &self.generate_assets,
            GenerationCall::SelectTemplates => &self.select_templates,
            GenerationCall::BuildMatrix => &self.build_matrix,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub kind: GeneratorKind,

    /// Base URL for the HTTP generator (feature `api-direct`)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub commands: ScriptCommands,
}

// =============================================================================
// Briefflow Configuration
// =============================================================================

/// Briefflow configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FlowConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl FlowConfig {
    /// Load config from briefflow.toml, falling back to defaults
    pub fn load(project_root: &Path) -> anyhow::Result<Self> {
        let config_path = project_root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: FlowConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to briefflow.toml
    pub fn save(&self, project_root: &Path) -> anyhow::Result<()> {
        let config_path = project_root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }
}
