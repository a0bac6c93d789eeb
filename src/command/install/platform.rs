//! Facts about the host, read once at startup.

use anyhow::{Result, anyhow};
use regex::Regex;
use std::{
    env, fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

const OS_RELEASE_FILE: &str = "/etc/os-release";

static VERSION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^VERSION_ID="(\d+\.\d+)""#).expect("VERSION_ID regex compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlatformFamily {
    Windows,
    WindowsArm,
    Linux,
    LinuxArm,
    Mac,
}

#[derive(Debug, Clone)]
pub(crate) struct PlatformFacts {
    pub(crate) family: PlatformFamily,
    pub(crate) arch: String,
    pub(crate) linux_distro_version: Option<String>,
    pub(crate) home_dir: PathBuf,
    pub(crate) temp_dir: PathBuf,
}

impl PlatformFacts {
    pub(crate) fn detect() -> Result<Self> {
        let arch = normalize_arch(env::consts::ARCH);
        let is_arm = arch == "arm64";
        let family = match env::consts::OS {
            "windows" if is_arm => PlatformFamily::WindowsArm,
            "windows" => PlatformFamily::Windows,
            "linux" if is_arm => PlatformFamily::LinuxArm,
            "linux" => PlatformFamily::Linux,
            "macos" => PlatformFamily::Mac,
            other => {
                return Err(anyhow!(
                    "unsupported platform: {other} on {}",
                    env::consts::ARCH
                ));
            }
        };
        let linux_distro_version = match family {
            PlatformFamily::Linux | PlatformFamily::LinuxArm => {
                Some(linux_distro_version_id(Path::new(OS_RELEASE_FILE)))
                    .filter(|v| !v.is_empty())
            }
            _ => None,
        };
        let home_dir = env::var_os("HOME")
            .or_else(|| env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("cannot resolve home directory: set `HOME`"))?;

        Ok(Self {
            family,
            arch,
            linux_distro_version,
            home_dir,
            temp_dir: env::temp_dir(),
        })
    }

    /// Platform segment used in vendor URLs and cache keys.
    pub(crate) fn canonical_name(&self) -> &'static str {
        match self.family {
            PlatformFamily::Windows => "windows",
            PlatformFamily::WindowsArm => "warm",
            PlatformFamily::Linux | PlatformFamily::LinuxArm => "linux",
            PlatformFamily::Mac => "mac",
        }
    }

    pub(crate) fn is_windows_family(&self) -> bool {
        matches!(
            self.family,
            PlatformFamily::Windows | PlatformFamily::WindowsArm
        )
    }

    pub(crate) fn is_arm(&self) -> bool {
        matches!(
            self.family,
            PlatformFamily::WindowsArm | PlatformFamily::LinuxArm
        )
    }

    pub(crate) fn default_destination(&self) -> PathBuf {
        if self.is_windows_family() {
            PathBuf::from("C:\\VulkanSDK\\")
        } else {
            self.home_dir.join("vulkan-sdk")
        }
    }
}

fn normalize_arch(arch: &str) -> String {
    match arch {
        "x86_64" => "x64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" => "ia32".to_string(),
        other => other.to_string(),
    }
}

/// `VERSION_ID` from an os-release file, or empty when unavailable.
pub(crate) fn linux_distro_version_id(os_release: &Path) -> String {
    match fs::read_to_string(os_release) {
        Ok(text) => parse_version_id(&text),
        Err(_) => String::new(),
    }
}

pub(crate) fn parse_version_id(text: &str) -> String {
    VERSION_ID_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
