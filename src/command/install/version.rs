//! Version tokens, `latest` resolution and the legacy ordinal compare.

use super::download::Remote;
use super::platform::PlatformFacts;
use crate::command::settings::Endpoints;
use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use std::{cmp::Ordering, collections::HashMap, sync::LazyLock};

static VERSION_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\d+$").expect("version regex compiles"));

const LATEST: &str = "latest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VersionToken {
    Latest,
    Exact(String),
}

impl VersionToken {
    /// Empty input means `latest`.
    pub(crate) fn parse(raw: Option<&str>) -> Result<Self> {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(LATEST) {
            return Ok(Self::Latest);
        }
        if !is_exact_version(trimmed) {
            bail!(
                "invalid Vulkan SDK version `{trimmed}`: expected `latest` or `major.minor.patch.revision`"
            );
        }
        Ok(Self::Exact(trimmed.to_string()))
    }
}

pub(crate) fn is_exact_version(raw: &str) -> bool {
    VERSION_TOKEN_RE.is_match(raw)
}

/// Parse the requested token; on a malformed token the error lists what is
/// published for this platform.
pub(crate) fn validate_requested(
    raw: Option<&str>,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<VersionToken> {
    let err = match VersionToken::parse(raw) {
        Ok(token) => return Ok(token),
        Err(err) => err,
    };
    match fetch_available_versions(facts, endpoints, remote) {
        Ok(versions) if !versions.is_empty() => Err(err.context(format!(
            "available versions for {}: {}",
            facts.canonical_name(),
            versions.join(", ")
        ))),
        Ok(_) => Err(err.context("no available versions were published for this platform")),
        Err(list_err) => Err(err.context(format!(
            "could not fetch the available versions list: {list_err:#}"
        ))),
    }
}

/// Concrete version for `token`; explicit versions pass through unchanged.
pub(crate) fn resolve(
    token: &VersionToken,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<String> {
    match token {
        VersionToken::Exact(version) => Ok(version.clone()),
        VersionToken::Latest => fetch_latest_version(facts, endpoints, remote),
    }
}

pub(crate) fn fetch_latest_version(
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<String> {
    let url = format!("{}/latest.json", endpoints.versions_base);
    let body = remote
        .get_text(&url)
        .with_context(|| format!("fetch latest Vulkan SDK versions from `{url}`"))?;
    parse_latest_document(&body, facts.canonical_name())
        .with_context(|| format!("parse latest versions document `{url}`"))
}

pub(crate) fn parse_latest_document(body: &str, platform: &str) -> Result<String> {
    let latest: HashMap<String, String> = serde_json::from_str(body)?;
    let version = latest
        .get(platform)
        .map(|v| v.trim())
        .ok_or_else(|| anyhow!("no `{platform}` entry in latest versions document"))?;
    if !is_exact_version(version) {
        bail!("latest `{platform}` version `{version}` is not a 4-component version");
    }
    Ok(version.to_string())
}

pub(crate) fn fetch_available_versions(
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<Vec<String>> {
    let url = format!(
        "{}/versions/{}.json",
        endpoints.versions_base,
        facts.canonical_name()
    );
    let body = remote
        .get_text(&url)
        .with_context(|| format!("fetch available Vulkan SDK versions from `{url}`"))?;
    let mut versions: Vec<String> = serde_json::from_str(&body)
        .with_context(|| format!("parse available versions document `{url}`"))?;
    versions.retain(|v| is_exact_version(v));
    versions.sort_by(|a, b| legacy_ordinal_compare(b, a));
    versions.dedup();
    Ok(versions)
}

/// Compare versions by dropping the dots and reading the rest as one integer.
///
/// `1.3.250.1` becomes `132501`. Not a per-component compare.
pub(crate) fn legacy_ordinal_compare(a: &str, b: &str) -> Ordering {
    let a = ordinal_digits(a);
    let b = ordinal_digits(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(&b))
}

fn ordinal_digits(version: &str) -> String {
    let digits: String = version.chars().filter(|c| *c != '.').collect();
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `version` orders strictly after `threshold` under the legacy compare.
pub(crate) fn is_newer_than(version: &str, threshold: &str) -> bool {
    legacy_ordinal_compare(version, threshold) == Ordering::Greater
}
