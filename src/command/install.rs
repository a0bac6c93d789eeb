//! `vulkan-sdk-setup install | url | versions`
//!
//! Resolves the requested SDK version, restores it from the cache or
//! downloads and installs it, verifies the result and exports the
//! environment later CI steps need.

mod archive;
mod cache;
mod components;
mod download;
mod installer;
mod platform;
mod url;
mod version;

use self::cache::{CacheKey, CacheStore, DirCacheStore, cache_paths, restore_cache, save_cache};
use self::components::{filter_components, supported_components_csv};
use self::download::{HttpRemote, Remote, download_runtime, download_sdk};
use self::installer::{
    InstallOptions, install_path_for, install_runtime, install_sdk, report_verification,
    runtime_probe_path, sdk_probe_path, sdk_root, stripdown, verify_runtime, verify_sdk,
};
use self::platform::{PlatformFacts, PlatformFamily};
use self::url::{build_runtime_url, build_sdk_url};
use self::version::{fetch_available_versions, fetch_latest_version, resolve, validate_requested};
use crate::{
    cli::{CommonArgs, InstallArgs},
    command::{
        actions,
        settings::{Endpoints, Settings},
    },
};
use anyhow::Result;
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

/// What the caller asked for, with defaults applied.
#[derive(Debug, Clone)]
pub(crate) struct InstallRequest {
    pub(crate) version: Option<String>,
    pub(crate) destination: PathBuf,
    pub(crate) install_runtime: bool,
    pub(crate) cache: bool,
    pub(crate) components: Vec<String>,
    pub(crate) stripdown: bool,
    pub(crate) strict: bool,
    pub(crate) runtime_settle_delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InstallOutcome {
    pub(crate) version: String,
    pub(crate) install_path: PathBuf,
    pub(crate) sdk_root: PathBuf,
    pub(crate) runtime_install_path: Option<PathBuf>,
    pub(crate) cache_hit: bool,
}

pub fn run(args: InstallArgs) -> Result<()> {
    let settings = Settings::from_install_args(args)?;
    let facts = PlatformFacts::detect()?;
    let remote = HttpRemote::new(settings.http_timeout);
    let request = build_request(&settings, &facts);
    println!(
        "🖥  Platform: {} ({}{})",
        facts.canonical_name(),
        facts.arch,
        if facts.is_arm() { ", arm" } else { "" }
    );

    let store = request.cache.then(|| {
        DirCacheStore::new(DirCacheStore::default_root(
            &facts,
            settings.cache_dir.as_deref(),
        ))
    });
    let outcome = execute(
        &request,
        &facts,
        &settings.endpoints,
        &remote,
        store.as_ref().map(|s| s as &dyn CacheStore),
    )?;

    let existing_lib = env::var(library_path_var(&facts)).ok();
    for (name, value) in environment_entries(&facts, &outcome, existing_lib.as_deref()) {
        actions::export_variable(name, &value)?;
    }
    actions::add_path(&outcome.sdk_root.join("bin"))?;
    for (name, value) in step_outputs(&outcome) {
        actions::set_output(name, &value)?;
    }
    println!(
        "✅ Vulkan SDK {} ready at {} (installed under {})",
        outcome.version,
        outcome.sdk_root.display(),
        outcome.install_path.display()
    );
    Ok(())
}

fn build_request(settings: &Settings, facts: &PlatformFacts) -> InstallRequest {
    let selection = filter_components(&settings.optional_components);
    if !selection.valid.is_empty() {
        println!("🧩 Optional components: {}", selection.valid.join(", "));
    }
    if !selection.invalid.is_empty() {
        actions::warning(&format!(
            "ignoring unknown optional components: {} (supported: {})",
            selection.invalid.join(", "),
            supported_components_csv()
        ));
    }
    InstallRequest {
        version: settings.version.clone(),
        destination: settings
            .destination
            .clone()
            .unwrap_or_else(|| facts.default_destination()),
        install_runtime: settings.install_runtime,
        cache: settings.cache,
        components: selection.valid,
        stripdown: settings.stripdown,
        strict: settings.strict,
        runtime_settle_delay: settings.runtime_settle_delay,
    }
}

/// Resolve, restore or install, then verify.
pub(crate) fn execute(
    request: &InstallRequest,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
    cache: Option<&dyn CacheStore>,
) -> Result<InstallOutcome> {
    let token = validate_requested(request.version.as_deref(), facts, endpoints, remote)?;
    let version = resolve(&token, facts, endpoints, remote)?;
    println!("🔖 Vulkan SDK version {version}");

    let install_path = install_path_for(facts, &request.destination, &version);
    let opts = InstallOptions {
        components: &request.components,
        strict: request.strict,
        runtime_settle_delay: request.runtime_settle_delay,
    };
    let want_runtime = request.install_runtime && facts.is_windows_family();
    if request.install_runtime && !want_runtime {
        actions::warning("runtime components are only published for Windows; skipping");
    }
    if request.stripdown && !facts.is_windows_family() {
        actions::warning("stripdown only applies to Windows installs; skipping");
    }

    let key = CacheKey::compute(facts.canonical_name(), &facts.arch, &version);
    let paths = cache_paths(facts, &request.destination, &version);
    let restored = cache.and_then(|store| restore_cache(store, &paths, &key));
    // Only an entry for this exact version counts; a fallback match is a warm start.
    let cache_hit = restored.as_deref() == Some(key.primary.as_str());
    if let Some(partial) = restored.as_deref().filter(|_| !cache_hit) {
        println!("📦 Reusing {partial} as a partial cache; installing {version}");
    }

    let mut runtime_install_path = None;
    if cache_hit {
        if want_runtime {
            runtime_install_path = Some(if verify_runtime(&install_path) {
                install_path.join("runtime")
            } else {
                fetch_and_install_runtime(&version, facts, endpoints, remote, &install_path, &opts)?
            });
        }
    } else {
        actions::grouped("Install Vulkan SDK", || {
            let artifact = download_sdk(&version, facts, endpoints, remote)?;
            install_sdk(
                facts,
                &version,
                &request.destination,
                &artifact.local_path,
                &opts,
            )
        })?;
        if want_runtime {
            runtime_install_path = Some(fetch_and_install_runtime(
                &version,
                facts,
                endpoints,
                remote,
                &install_path,
                &opts,
            )?);
        }
        if request.stripdown && facts.is_windows_family() {
            stripdown(&install_path)?;
        }
    }

    let root = sdk_root(facts, &install_path, &version);
    report_verification(
        "Vulkan SDK",
        &sdk_probe_path(facts, &install_path, &version),
        verify_sdk(facts, &install_path, &version),
        request.strict,
    )?;
    if want_runtime {
        report_verification(
            "Vulkan runtime",
            &runtime_probe_path(&install_path),
            verify_runtime(&install_path),
            request.strict,
        )?;
    }

    if !cache_hit && let Some(store) = cache {
        save_cache(store, &paths, &key);
    }

    Ok(InstallOutcome {
        version,
        install_path,
        sdk_root: root,
        runtime_install_path,
        cache_hit,
    })
}

fn fetch_and_install_runtime(
    version: &str,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
    install_path: &Path,
    opts: &InstallOptions<'_>,
) -> Result<PathBuf> {
    actions::grouped("Install Vulkan runtime", || {
        let artifact = download_runtime(version, facts, endpoints, remote)?;
        install_runtime(facts, install_path, &artifact.local_path, opts)
    })
}

fn library_path_var(facts: &PlatformFacts) -> &'static str {
    match facts.family {
        PlatformFamily::Mac => "DYLD_LIBRARY_PATH",
        _ => "LD_LIBRARY_PATH",
    }
}

/// Variables exported for later steps. `PATH` is handled separately.
pub(crate) fn environment_entries(
    facts: &PlatformFacts,
    outcome: &InstallOutcome,
    existing_lib: Option<&str>,
) -> Vec<(&'static str, String)> {
    let root = &outcome.sdk_root;
    let mut entries = vec![
        ("VULKAN_SDK", root.display().to_string()),
        ("VULKAN_VERSION", outcome.version.clone()),
    ];
    if facts.is_windows_family() {
        return entries;
    }
    entries.push((
        "VK_LAYER_PATH",
        root.join("etc")
            .join("vulkan")
            .join("explicit_layer.d")
            .display()
            .to_string(),
    ));
    let lib = root.join("lib").display().to_string();
    let lib_path = match existing_lib.filter(|v| !v.is_empty()) {
        Some(existing) => format!("{lib}:{existing}"),
        None => lib,
    };
    entries.push((library_path_var(facts), lib_path));
    entries
}

/// Step outputs. `VULKAN_RUNTIME` is only set when a runtime was installed.
pub(crate) fn step_outputs(outcome: &InstallOutcome) -> Vec<(&'static str, String)> {
    let mut outputs = vec![
        ("VULKAN_SDK", outcome.sdk_root.display().to_string()),
        ("VULKAN_VERSION", outcome.version.clone()),
        ("cache-hit", outcome.cache_hit.to_string()),
    ];
    if let Some(runtime) = &outcome.runtime_install_path {
        outputs.push(("VULKAN_RUNTIME", runtime.display().to_string()));
    }
    outputs
}

/// Print the resolved version and download URLs without installing.
pub fn print_urls(version: Option<String>, common: CommonArgs) -> Result<()> {
    let settings = Settings::from_common_args(common, version)?;
    let facts = PlatformFacts::detect()?;
    let remote = HttpRemote::new(settings.http_timeout);
    let token = validate_requested(
        settings.version.as_deref(),
        &facts,
        &settings.endpoints,
        &remote,
    )?;
    let version = resolve(&token, &facts, &settings.endpoints, &remote)?;

    println!("platform: {}", facts.canonical_name());
    println!("version:  {version}");
    println!(
        "sdk:      {}",
        build_sdk_url(&version, &facts, &settings.endpoints)
    );
    match build_runtime_url(&version, &facts, &settings.endpoints) {
        Some(url) => println!("runtime:  {url}"),
        None => println!("runtime:  -"),
    }
    Ok(())
}

/// List versions published for this platform, newest first.
pub fn print_versions(common: CommonArgs) -> Result<()> {
    let settings = Settings::from_common_args(common, None)?;
    let facts = PlatformFacts::detect()?;
    let remote = HttpRemote::new(settings.http_timeout);
    let latest = fetch_latest_version(&facts, &settings.endpoints, &remote)?;
    let versions = fetch_available_versions(&facts, &settings.endpoints, &remote)?;

    println!("📋 Vulkan SDK versions for {}:", facts.canonical_name());
    for version in &versions {
        if *version == latest {
            println!("  {version} (latest)");
        } else {
            println!("  {version}");
        }
    }
    if !versions.contains(&latest) {
        println!("latest: {latest}");
    }
    Ok(())
}
