//! Vendor download naming, one strategy per platform variant.

use super::platform::{PlatformFacts, PlatformFamily};
use super::version::is_newer_than;
use crate::command::settings::Endpoints;

/// Linux x86_64 archives switched from `.tar.gz` to `.tar.xz` after this release.
const LINUX_XZ_AFTER: &str = "1.3.250.1";
/// macOS switched from `.dmg` to `.zip` after this release.
const MAC_ZIP_AFTER: &str = "1.3.290.0";
const LINUX_ARM_DEFAULT_DISTRO: &str = "24.04";
const LINUX_ARM_LEGACY_DISTRO: &str = "20.04";
const RUNTIME_FILE_NAME: &str = "vulkan-runtime-components.zip";

pub(crate) trait PlatformStrategy {
    fn canonical_name(&self) -> &'static str;

    fn sdk_filename(&self, version: &str) -> String;

    fn sdk_url(&self, version: &str, endpoints: &Endpoints) -> String {
        format!(
            "{}/{}",
            platform_base(endpoints, version, self.canonical_name()),
            self.sdk_filename(version)
        )
    }

    fn runtime_url(&self, _version: &str, _endpoints: &Endpoints) -> Option<String> {
        None
    }
}

struct Windows;
struct WindowsArm;
struct Linux;
struct LinuxArm {
    distro: &'static str,
}
struct Mac;

impl PlatformStrategy for Windows {
    fn canonical_name(&self) -> &'static str {
        "windows"
    }

    fn sdk_filename(&self, version: &str) -> String {
        format!("VulkanSDK-{version}-Installer.exe")
    }

    fn runtime_url(&self, version: &str, endpoints: &Endpoints) -> Option<String> {
        Some(runtime_url(endpoints, version, self.canonical_name()))
    }
}

impl PlatformStrategy for WindowsArm {
    fn canonical_name(&self) -> &'static str {
        "warm"
    }

    fn sdk_filename(&self, version: &str) -> String {
        format!("InstallVulkanARM64-{version}.exe")
    }

    fn runtime_url(&self, version: &str, endpoints: &Endpoints) -> Option<String> {
        Some(runtime_url(endpoints, version, self.canonical_name()))
    }
}

impl PlatformStrategy for Linux {
    fn canonical_name(&self) -> &'static str {
        "linux"
    }

    fn sdk_filename(&self, version: &str) -> String {
        let ext = if is_newer_than(version, LINUX_XZ_AFTER) {
            "tar.xz"
        } else {
            "tar.gz"
        };
        format!("vulkansdk-linux-x86_64-{version}.{ext}")
    }
}

impl PlatformStrategy for LinuxArm {
    fn canonical_name(&self) -> &'static str {
        "linux"
    }

    fn sdk_filename(&self, version: &str) -> String {
        format!("vulkansdk-ubuntu-{}-arm-{version}.tar.xz", self.distro)
    }

    // Published by a separate release repository, not the vendor host.
    fn sdk_url(&self, version: &str, endpoints: &Endpoints) -> String {
        format!(
            "{}/{version}/{}",
            endpoints.linux_arm_base,
            self.sdk_filename(version)
        )
    }
}

impl PlatformStrategy for Mac {
    fn canonical_name(&self) -> &'static str {
        "mac"
    }

    fn sdk_filename(&self, version: &str) -> String {
        let ext = if is_newer_than(version, MAC_ZIP_AFTER) {
            "zip"
        } else {
            "dmg"
        };
        format!("vulkansdk-macos-{version}.{ext}")
    }
}

pub(crate) fn strategy_for(facts: &PlatformFacts) -> Box<dyn PlatformStrategy> {
    match facts.family {
        PlatformFamily::Windows => Box::new(Windows),
        PlatformFamily::WindowsArm => Box::new(WindowsArm),
        PlatformFamily::Linux => Box::new(Linux),
        PlatformFamily::LinuxArm => Box::new(LinuxArm {
            distro: linux_arm_distro(facts),
        }),
        PlatformFamily::Mac => Box::new(Mac),
    }
}

pub(crate) fn build_sdk_url(version: &str, facts: &PlatformFacts, endpoints: &Endpoints) -> String {
    strategy_for(facts).sdk_url(version, endpoints)
}

pub(crate) fn build_sdk_filename(version: &str, facts: &PlatformFacts) -> String {
    strategy_for(facts).sdk_filename(version)
}

pub(crate) fn build_runtime_url(
    version: &str,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
) -> Option<String> {
    strategy_for(facts).runtime_url(version, endpoints)
}

/// Only an exact `20.04` probe selects the older build.
fn linux_arm_distro(facts: &PlatformFacts) -> &'static str {
    match facts.linux_distro_version.as_deref() {
        Some(LINUX_ARM_LEGACY_DISTRO) => LINUX_ARM_LEGACY_DISTRO,
        _ => LINUX_ARM_DEFAULT_DISTRO,
    }
}

fn platform_base(endpoints: &Endpoints, version: &str, canonical: &str) -> String {
    format!("{}/{version}/{canonical}", endpoints.download_base)
}

fn runtime_url(endpoints: &Endpoints, version: &str, canonical: &str) -> String {
    format!(
        "{}/{RUNTIME_FILE_NAME}",
        platform_base(endpoints, version, canonical)
    )
}
