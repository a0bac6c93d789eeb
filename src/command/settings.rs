//! Run settings: command-line/`INPUT_*` values layered over an optional TOML file.

use crate::cli::{CommonArgs, InstallArgs};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_DOWNLOAD_BASE: &str = "https://sdk.lunarg.com/sdk/download";
pub const DEFAULT_VERSIONS_BASE: &str = "https://vulkan.lunarg.com/sdk";
pub const DEFAULT_LINUX_ARM_BASE: &str =
    "https://github.com/jakoch/vulkan-sdk-arm/releases/download";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Remote locations the installer talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub download_base: String,
    pub versions_base: String,
    pub linux_arm_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            versions_base: DEFAULT_VERSIONS_BASE.to_string(),
            linux_arm_base: DEFAULT_LINUX_ARM_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub version: Option<String>,
    pub destination: Option<PathBuf>,
    pub install_runtime: bool,
    pub cache: bool,
    pub optional_components: Vec<String>,
    pub stripdown: bool,
    pub strict: bool,
    pub cache_dir: Option<PathBuf>,
    pub http_timeout: Duration,
    pub runtime_settle_delay: Duration,
    pub endpoints: Endpoints,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    destination: Option<PathBuf>,
    #[serde(default)]
    install_runtime: Option<bool>,
    #[serde(default)]
    cache: Option<bool>,
    #[serde(default)]
    optional_components: Option<Vec<String>>,
    #[serde(default)]
    stripdown: Option<bool>,
    #[serde(default)]
    strict: Option<bool>,
    #[serde(default)]
    cache_dir: Option<PathBuf>,
    #[serde(default)]
    http_timeout: Option<String>,
    #[serde(default)]
    runtime_settle_delay: Option<String>,
    #[serde(default)]
    endpoints: EndpointsConfig,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointsConfig {
    #[serde(default)]
    download_base: Option<String>,
    #[serde(default)]
    versions_base: Option<String>,
    #[serde(default)]
    linux_arm_base: Option<String>,
}

impl Settings {
    pub fn from_install_args(args: InstallArgs) -> Result<Self> {
        let file = load_file_config(args.common.config.as_deref())?;
        Self::merge(args, file)
    }

    pub fn from_common_args(common: CommonArgs, version: Option<String>) -> Result<Self> {
        Self::from_install_args(InstallArgs {
            version,
            common,
            ..InstallArgs::default()
        })
    }

    fn merge(args: InstallArgs, file: FileConfig) -> Result<Self> {
        let optional_components = match args.optional_components {
            Some(raw) => split_components(&raw),
            None => file
                .optional_components
                .unwrap_or_default()
                .into_iter()
                .flat_map(|raw| split_components(&raw))
                .collect(),
        };
        let http_timeout = match args.common.http_timeout.or(file.http_timeout) {
            Some(raw) => parse_duration_setting("http-timeout", &raw)?,
            None => DEFAULT_HTTP_TIMEOUT,
        };
        if http_timeout.is_zero() {
            bail!("http-timeout must be greater than zero");
        }
        let runtime_settle_delay = match args.runtime_settle_delay.or(file.runtime_settle_delay) {
            Some(raw) => parse_duration_setting("runtime-settle-delay", &raw)?,
            None => Duration::ZERO,
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            download_base: normalize_base(file.endpoints.download_base)
                .unwrap_or(defaults.download_base),
            versions_base: normalize_base(file.endpoints.versions_base)
                .unwrap_or(defaults.versions_base),
            linux_arm_base: normalize_base(file.endpoints.linux_arm_base)
                .unwrap_or(defaults.linux_arm_base),
        };

        Ok(Self {
            version: normalize_value(args.version.or(file.version)),
            destination: args
                .destination
                .or(file.destination)
                .filter(|p| !p.as_os_str().is_empty()),
            install_runtime: args.install_runtime.or(file.install_runtime).unwrap_or(false),
            cache: args.cache.or(file.cache).unwrap_or(false),
            optional_components,
            stripdown: args.stripdown.or(file.stripdown).unwrap_or(false),
            strict: args.strict.or(file.strict).unwrap_or(false),
            cache_dir: args.cache_dir.or(file.cache_dir),
            http_timeout,
            runtime_settle_delay,
            endpoints,
        })
    }
}

fn load_file_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    if !path.is_file() {
        bail!("config path is not a file: {}", path.display());
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    parse_file_config(&raw).with_context(|| format!("parse TOML config {}", path.display()))
}

fn parse_file_config(raw: &str) -> Result<FileConfig> {
    Ok(toml::from_str::<FileConfig>(raw)?)
}

fn parse_duration_setting(name: &str, raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .with_context(|| format!("invalid duration `{raw}` for {name}"))
}

pub(crate) fn split_components(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_value(raw: Option<String>) -> Option<String> {
    let raw = raw?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn normalize_base(raw: Option<String>) -> Option<String> {
    normalize_value(raw).map(|v| v.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_file_values() {
        let file = parse_file_config(
            r#"
version = "1.3.250.1"
cache = true
stripdown = true
optional_components = ["com.lunarg.vulkan.glm", "com.lunarg.vulkan.vma"]

[endpoints]
download_base = "https://mirror.example/sdk/download/"
"#,
        )
        .expect("valid config");
        let args = InstallArgs {
            version: Some("1.4.304.0".to_string()),
            cache: Some(false),
            optional_components: Some("com.lunarg.vulkan.volk".to_string()),
            ..InstallArgs::default()
        };

        let settings = Settings::merge(args, file).expect("merge");
        assert_eq!(settings.version.as_deref(), Some("1.4.304.0"));
        assert!(!settings.cache);
        assert!(settings.stripdown);
        assert_eq!(settings.optional_components, vec!["com.lunarg.vulkan.volk"]);
        assert_eq!(
            settings.endpoints.download_base,
            "https://mirror.example/sdk/download"
        );
        assert_eq!(settings.endpoints.versions_base, DEFAULT_VERSIONS_BASE);
    }

    #[test]
    fn defaults_apply_without_file_or_flags() {
        let settings = Settings::merge(InstallArgs::default(), FileConfig::default())
            .expect("merge defaults");
        assert!(settings.version.is_none());
        assert!(settings.destination.is_none());
        assert!(!settings.install_runtime);
        assert!(!settings.cache);
        assert!(!settings.strict);
        assert!(settings.optional_components.is_empty());
        assert_eq!(settings.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(settings.runtime_settle_delay, Duration::ZERO);
        assert_eq!(settings.endpoints, Endpoints::default());
    }

    #[test]
    fn blank_version_is_treated_as_unset() {
        let args = InstallArgs {
            version: Some("   ".to_string()),
            ..InstallArgs::default()
        };
        let settings = Settings::merge(args, FileConfig::default()).expect("merge");
        assert!(settings.version.is_none());
    }

    #[test]
    fn durations_use_humantime_syntax() {
        let args = InstallArgs {
            runtime_settle_delay: Some("3s".to_string()),
            common: CommonArgs {
                http_timeout: Some("2m".to_string()),
                ..CommonArgs::default()
            },
            ..InstallArgs::default()
        };
        let settings = Settings::merge(args, FileConfig::default()).expect("merge");
        assert_eq!(settings.http_timeout, Duration::from_secs(120));
        assert_eq!(settings.runtime_settle_delay, Duration::from_secs(3));

        let bad = InstallArgs {
            common: CommonArgs {
                http_timeout: Some("soon".to_string()),
                ..CommonArgs::default()
            },
            ..InstallArgs::default()
        };
        assert!(Settings::merge(bad, FileConfig::default()).is_err());
    }

    #[test]
    fn split_components_drops_blank_entries() {
        assert_eq!(
            split_components(" com.lunarg.vulkan.vma, ,bogus.one,"),
            vec!["com.lunarg.vulkan.vma", "bogus.one"]
        );
    }
}
