//! Per-platform installation, runtime relocation, stripdown and verification.

use super::archive::{
    ArchiveFormat, collect_dir_names, copy_dir_recursive, extract_archive, find_child,
};
use super::platform::{PlatformFacts, PlatformFamily};
use crate::command::{actions, unique_temp_dir};
use anyhow::{Context, Result, bail};
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Command,
    thread,
    time::Duration,
};

const MAC_VOLUMES_DIR: &str = "/Volumes";
const MAC_VOLUME_MARKER: &str = "VulkanSDK";
const STRIPDOWN_FOLDERS: [&str; 5] = [
    "Demos",
    "Helpers",
    "installerResources",
    "Licenses",
    "Templates",
];
const RUNTIME_DIR: &str = "runtime";

#[derive(Debug, Clone)]
pub(crate) struct InstallOptions<'a> {
    pub(crate) components: &'a [String],
    pub(crate) strict: bool,
    pub(crate) runtime_settle_delay: Duration,
}

/// Where an SDK for `version` lives under `destination`.
pub(crate) fn install_path_for(facts: &PlatformFacts, destination: &Path, version: &str) -> PathBuf {
    if facts.is_windows_family() {
        destination.join(version)
    } else {
        destination.to_path_buf()
    }
}

pub(crate) fn install_sdk(
    facts: &PlatformFacts,
    version: &str,
    destination: &Path,
    artifact: &Path,
    opts: &InstallOptions<'_>,
) -> Result<PathBuf> {
    match facts.family {
        PlatformFamily::Linux | PlatformFamily::LinuxArm => {
            println!("🐧 Installing Vulkan SDK {version} to {}", destination.display());
            extract_archive(artifact, destination)?;
            Ok(destination.to_path_buf())
        }
        PlatformFamily::Mac if is_zip(artifact) => {
            println!("🍎 Installing Vulkan SDK {version} from zip");
            let staging = unique_temp_dir(&facts.temp_dir, "vulkan-sdk-zip")?;
            let result = extract_archive(artifact, &staging)
                .and_then(|()| run_mac_installer(&staging, destination, opts));
            let _ = fs::remove_dir_all(&staging);
            result?;
            Ok(destination.to_path_buf())
        }
        PlatformFamily::Mac => {
            println!("🍎 Installing Vulkan SDK {version} from disk image");
            install_from_dmg(facts, artifact, destination, opts)?;
            Ok(destination.to_path_buf())
        }
        PlatformFamily::Windows | PlatformFamily::WindowsArm => {
            let install_path = install_path_for(facts, destination, version);
            println!(
                "🪟 Installing Vulkan SDK {version} to {}",
                install_path.display()
            );
            let args = installer_args(&install_path, opts.components);
            let success = run_elevated_windows(artifact, &args)?;
            check_installer_exit(success, artifact, opts.strict)?;
            Ok(install_path)
        }
    }
}

fn is_zip(artifact: &Path) -> bool {
    artifact
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(ArchiveFormat::from_file_name)
        == Some(ArchiveFormat::Zip)
}

fn install_from_dmg(
    facts: &PlatformFacts,
    dmg: &Path,
    destination: &Path,
    opts: &InstallOptions<'_>,
) -> Result<()> {
    let status = Command::new("hdiutil")
        .arg("attach")
        .arg("-nobrowse")
        .arg("-readonly")
        .arg(dmg)
        .status()
        .with_context(|| format!("run `hdiutil attach {}`", dmg.display()))?;
    if !status.success() {
        bail!("`hdiutil attach {}` exited with {status}", dmg.display());
    }

    let Some(volume) = find_child(Path::new(MAC_VOLUMES_DIR), |name| {
        name.contains(MAC_VOLUME_MARKER)
    })?
    else {
        let msg = format!("no mounted volume containing `{MAC_VOLUME_MARKER}` under {MAC_VOLUMES_DIR}");
        if opts.strict {
            bail!(msg);
        }
        actions::error(&msg);
        return Ok(());
    };

    let staging = unique_temp_dir(&facts.temp_dir, "vulkan-sdk-dmg")?;
    let copied = copy_dir_recursive(&volume, &staging);
    let _ = Command::new("hdiutil").arg("detach").arg(&volume).status();
    let result = copied.and_then(|()| run_mac_installer(&staging, destination, opts));
    let _ = fs::remove_dir_all(&staging);
    result
}

fn run_mac_installer(staging: &Path, destination: &Path, opts: &InstallOptions<'_>) -> Result<()> {
    let Some(app) = find_child(staging, |name| name.ends_with(".app"))? else {
        bail!("no installer app bundle found in {}", staging.display());
    };
    let stem = app
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    let installer = app.join("Contents").join("MacOS").join(stem);
    let status = Command::new("sudo")
        .arg(&installer)
        .args(installer_args(destination, opts.components))
        .status()
        .with_context(|| format!("run installer {}", installer.display()))?;
    check_installer_exit(status.success(), &installer, opts.strict)
}

pub(crate) fn installer_args(root: &Path, components: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--root".into(),
        root.as_os_str().to_os_string(),
        "--accept-licenses".into(),
        "--default-answer".into(),
        "--confirm-command".into(),
        "install".into(),
    ];
    args.extend(components.iter().map(OsString::from));
    args
}

/// Runs `program` elevated and blocks until the elevated process has exited.
fn run_elevated_windows(program: &Path, args: &[OsString]) -> Result<bool> {
    let arg_list = args
        .iter()
        .map(|a| ps_single_quote(&a.to_string_lossy()))
        .collect::<Vec<_>>()
        .join(",");
    let script = format!(
        "$p = Start-Process -FilePath {} -ArgumentList @({arg_list}) -Verb RunAs -Wait -PassThru; exit $p.ExitCode",
        ps_single_quote(&program.to_string_lossy())
    );
    let status = Command::new("powershell")
        .arg("-NoProfile")
        .arg("-NonInteractive")
        .arg("-Command")
        .arg(&script)
        .status()
        .with_context(|| format!("run elevated installer {}", program.display()))?;
    Ok(status.success())
}

/// PowerShell literal; arguments with spaces keep embedded double quotes
/// because `Start-Process` joins the list verbatim.
pub(crate) fn ps_single_quote(raw: &str) -> String {
    let value = if raw.chars().any(char::is_whitespace) {
        format!("\"{raw}\"")
    } else {
        raw.to_string()
    };
    format!("'{}'", value.replace('\'', "''"))
}

fn check_installer_exit(success: bool, installer: &Path, strict: bool) -> Result<()> {
    if success {
        return Ok(());
    }
    let msg = format!("installer {} reported failure", installer.display());
    if strict {
        bail!(msg);
    }
    actions::warning(&format!("{msg}; continuing to verification"));
    Ok(())
}

/// Unpack the runtime zip into `<install>/runtime`.
pub(crate) fn install_runtime(
    facts: &PlatformFacts,
    install_path: &Path,
    artifact: &Path,
    opts: &InstallOptions<'_>,
) -> Result<PathBuf> {
    let runtime_path = install_path.join(RUNTIME_DIR);
    let staging = unique_temp_dir(&facts.temp_dir, "vulkan-runtime")?;
    let result = relocate_runtime(artifact, &staging, &runtime_path, opts.runtime_settle_delay);
    let _ = fs::remove_dir_all(&staging);
    result?;
    println!("📦 Installed Vulkan runtime to {}", runtime_path.display());
    Ok(runtime_path)
}

fn relocate_runtime(
    artifact: &Path,
    staging: &Path,
    runtime_path: &Path,
    settle_delay: Duration,
) -> Result<()> {
    extract_archive(artifact, staging)?;
    if !settle_delay.is_zero() {
        thread::sleep(settle_delay);
    }
    copy_dir_recursive(&runtime_source_dir(staging)?, runtime_path)
}

/// The archive wraps everything in one top-level folder of unknown name.
pub(crate) fn runtime_source_dir(staging: &Path) -> Result<PathBuf> {
    let dirs = collect_dir_names(staging)?;
    match dirs.as_slice() {
        [single] => Ok(staging.join(single)),
        [] => Ok(staging.to_path_buf()),
        many => bail!(
            "runtime archive has {} top-level folders ({}); expected one",
            many.len(),
            many.join(", ")
        ),
    }
}

/// Shrink a Windows install before caching. Missing folders are skipped.
pub(crate) fn stripdown(install_path: &Path) -> Result<()> {
    println!("✂️  Stripping down {}", install_path.display());
    for folder in STRIPDOWN_FOLDERS {
        let path = install_path.join(folder);
        if !path.is_dir() {
            println!("ℹ️  Stripdown: {folder} not found, skipping");
            continue;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => println!("🗑  Removed {}", path.display()),
            Err(err) => actions::warning(&format!("could not remove {}: {err}", path.display())),
        }
    }

    for entry in fs::read_dir(install_path)
        .with_context(|| format!("read dir {}", install_path.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if let Err(err) = fs::remove_file(&path) {
            actions::warning(&format!("could not remove {}: {err}", path.display()));
        }
    }
    Ok(())
}

fn arch_dir(facts: &PlatformFacts) -> &'static str {
    match facts.family {
        PlatformFamily::LinuxArm => "aarch64",
        PlatformFamily::Mac => "macOS",
        _ => "x86_64",
    }
}

/// Directory holding `bin/`, `lib/` and friends.
///
/// Linux archives unpack to `<version>/x86_64`, the macOS installer writes
/// `macOS/`, Windows installs directly into the install path. Falls back to
/// the install path itself.
pub(crate) fn sdk_root(facts: &PlatformFacts, install_path: &Path, version: &str) -> PathBuf {
    if facts.is_windows_family() {
        return install_path.to_path_buf();
    }
    let arch = arch_dir(facts);
    let candidates = [install_path.join(version).join(arch), install_path.join(arch)];
    candidates
        .into_iter()
        .find(|c| c.is_dir())
        .unwrap_or_else(|| install_path.to_path_buf())
}

pub(crate) fn sdk_probe_path(facts: &PlatformFacts, install_path: &Path, version: &str) -> PathBuf {
    let bin = sdk_root(facts, install_path, version).join("bin");
    if facts.is_windows_family() {
        bin.join("vulkaninfoSDK.exe")
    } else {
        bin.join("vulkaninfo")
    }
}

pub(crate) fn runtime_probe_path(install_path: &Path) -> PathBuf {
    install_path
        .join(RUNTIME_DIR)
        .join("x64")
        .join("vulkan-1.dll")
}

pub(crate) fn verify_sdk(facts: &PlatformFacts, install_path: &Path, version: &str) -> bool {
    sdk_probe_path(facts, install_path, version).is_file()
}

pub(crate) fn verify_runtime(install_path: &Path) -> bool {
    runtime_probe_path(install_path).is_file()
}

/// Warn, or fail in strict mode, when a probe is missing.
pub(crate) fn report_verification(what: &str, probe: &Path, present: bool, strict: bool) -> Result<()> {
    if present {
        println!("✅ {what} installed: found {}", probe.display());
        return Ok(());
    }
    let msg = format!("{what} not installed: {} is missing", probe.display());
    if strict {
        bail!(msg);
    }
    actions::warning(&msg);
    Ok(())
}
