//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from TOML and carries the
//! tool locations, the pipeline defaults, and per-profile parameter
//! overrides. Every section defaults sensibly so a completely empty file is
//! valid. The config is built by the caller and passed down explicitly; no
//! component reads it from global state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Profile / device enums
// ---------------------------------------------------------------------------

/// Quality tier trading reconstruction speed against output fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProfileId {
    #[serde(alias = "speed", alias = "Speed")]
    Speed,
    #[default]
    #[serde(alias = "balanced", alias = "Balanced")]
    Balanced,
    #[serde(alias = "quality", alias = "Quality")]
    Quality,
}

impl ProfileId {
    /// All profiles, fastest first.
    pub const ALL: [ProfileId; 3] = [ProfileId::Speed, ProfileId::Balanced, ProfileId::Quality];

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileId::Speed => "SPEED",
            ProfileId::Balanced => "BALANCED",
            ProfileId::Quality => "QUALITY",
        }
    }

    /// Parse a profile name, falling back to [`ProfileId::Balanced`] for
    /// anything unrecognized so callers never have to handle a lookup error.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!("Unknown profile '{name}'; falling back to BALANCED");
            ProfileId::default()
        })
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SPEED" => Ok(ProfileId::Speed),
            "BALANCED" => Ok(ProfileId::Balanced),
            "QUALITY" => Ok(ProfileId::Quality),
            other => Err(Error::Validation(format!(
                "unknown profile '{other}' (valid: SPEED, BALANCED, QUALITY)"
            ))),
        }
    }
}

/// Compute device requested for the stages that can use a GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Device {
    /// Let each tool pick its own default.
    #[default]
    #[serde(alias = "auto", alias = "Auto")]
    Auto,
    #[serde(alias = "cpu", alias = "Cpu")]
    Cpu,
    #[serde(alias = "cuda", alias = "Cuda")]
    Cuda,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Auto => "AUTO",
            Device::Cpu => "CPU",
            Device::Cuda => "CUDA",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(Device::Auto),
            "CPU" => Ok(Device::Cpu),
            "CUDA" | "GPU" => Ok(Device::Cuda),
            other => Err(Error::Validation(format!(
                "unknown device '{other}' (valid: AUTO, CPU, CUDA)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub pipeline: PipelineSettings,
    /// Parameter overrides applied on top of the built-in profile tables,
    /// in file order.
    #[serde(default)]
    pub profiles: Vec<ProfileOverride>,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ref colmap) = self.tools.colmap_path {
            if !colmap.exists() {
                warnings.push(format!("tools.colmap_path {} does not exist", colmap.display()));
            }
        }

        if let Some(ref dir) = self.tools.openmvs_bin_dir {
            if !dir.is_dir() {
                warnings.push(format!(
                    "tools.openmvs_bin_dir {} is not a directory",
                    dir.display()
                ));
            }
        }

        if self.tools.timeout_secs == Some(0) {
            warnings.push("tools.timeout_secs is 0; every stage would time out immediately".into());
        }

        if self.pipeline.image_extensions.is_empty() {
            warnings.push("pipeline.image_extensions is empty; no dataset will be accepted".into());
        }

        if self.pipeline.output_tail_lines == 0 {
            warnings.push("pipeline.output_tail_lines is 0; failures will carry no output".into());
        }

        for (i, o) in self.profiles.iter().enumerate() {
            if o.step.trim().is_empty() {
                warnings.push(format!("profiles[{i}].step is empty"));
            }
            if !o.flag.starts_with('-') {
                warnings.push(format!(
                    "profiles[{i}].flag '{}' does not look like a command-line flag",
                    o.flag
                ));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Locations of the external reconstruction tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Path to the `colmap` executable. Searched in `PATH` when unset.
    pub colmap_path: Option<PathBuf>,
    /// Directory holding the OpenMVS binaries (`InterfaceCOLMAP`,
    /// `DensifyPointCloud`, ...). Searched in `PATH` when unset.
    pub openmvs_bin_dir: Option<PathBuf>,
    /// Per-process timeout. Stages run without a limit when unset.
    pub timeout_secs: Option<u64>,
}

/// Defaults for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub profile: ProfileId,
    pub device: Device,
    /// Camera model passed to COLMAP feature extraction.
    pub camera_model: String,
    /// Recognized image extensions, compared case-insensitively.
    pub image_extensions: Vec<String>,
    /// Number of trailing output lines kept per process for diagnostics.
    pub output_tail_lines: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            profile: ProfileId::default(),
            device: Device::default(),
            camera_model: "PINHOLE".into(),
            image_extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            output_tail_lines: 50,
        }
    }
}

/// One flag override for one step of one profile.
///
/// An override whose flag already exists in the built-in table replaces the
/// value in place; a new flag is appended after the built-in ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOverride {
    pub profile: ProfileId,
    /// Tool step name, e.g. `DensifyPointCloud` or `feature_extractor`.
    pub step: String,
    pub flag: String,
    pub value: String,
}
