//! HTTP access: JSON documents, reachability probes and streamed downloads.

use super::platform::PlatformFacts;
use super::url::{build_runtime_url, build_sdk_filename, build_sdk_url};
use crate::command::{actions, settings::Endpoints, unique_temp_dir};
use anyhow::{Context, Result, anyhow, bail};
use http::Method;
use reqx::{
    RedirectPolicy, RetryPolicy,
    blocking::{Client, ClientBuilder},
};
use std::{
    env,
    fs::{self, File},
    io::{self, IsTerminal, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

const HTTP_USER_AGENT: &str = "vulkan-sdk-setup/0.1";
const CLIENT_NAME: &str = "vulkan-sdk-setup";
const PROXY_HINT: &str =
    "if your network requires a proxy, set HTTPS_PROXY/HTTP_PROXY (and optional NO_PROXY)";

/// Network side of the pipeline.
pub(crate) trait Remote {
    /// Body of a successful GET.
    fn get_text(&self, url: &str) -> Result<String>;
    /// Errors when `url` is unreachable or answers with a non-success status.
    fn probe(&self, url: &str) -> Result<()>;
    /// Stream `url` into `dest`, returning the byte count.
    fn download(&self, url: &str, dest: &Path) -> Result<u64>;
}

pub(crate) struct HttpRemote {
    timeout: Duration,
}

impl HttpRemote {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Remote for HttpRemote {
    fn get_text(&self, url: &str) -> Result<String> {
        let parts = parse_url_parts(url)?;
        let client = build_http_client(&parts.base_url, self.timeout, RequestKind::Metadata)?;
        let req = client
            .get(parts.path_and_query)
            .try_header("user-agent", HTTP_USER_AGENT)
            .context("set user-agent")?
            .try_header("accept", "application/json")
            .context("set accept header")?;
        let response = req
            .send_with_status()
            .with_context(|| format!("query `{url}` ({PROXY_HINT})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!(
                "query `{url}` failed: status {} body {}",
                status,
                truncate_for_log(&response.text_lossy(), 200)
            );
        }
        Ok(response.text_lossy().to_string())
    }

    fn probe(&self, url: &str) -> Result<()> {
        let parts = parse_url_parts(url)?;
        let client = build_http_client(&parts.base_url, self.timeout, RequestKind::Metadata)?;
        let response = client
            .request(Method::HEAD, parts.path_and_query)
            .try_header("user-agent", HTTP_USER_AGENT)
            .context("set user-agent")?
            .send_with_status()
            .with_context(|| format!("reach `{url}` ({PROXY_HINT})"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("`{url}` answered HEAD with status {status}");
        }
        Ok(())
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let parts = parse_url_parts(url)?;
        let client = build_http_client(&parts.base_url, self.timeout, RequestKind::Download)?;
        let req = client
            .get(parts.path_and_query)
            .try_header("user-agent", HTTP_USER_AGENT)
            .context("set download user-agent")?;
        let mut resp = req
            .send_stream()
            .with_context(|| format!("download from `{url}` ({PROXY_HINT})"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("download from `{url}` failed: status {status}");
        }
        let total_bytes = resp
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let mut out = File::create(dest)
            .with_context(|| format!("create downloaded file {}", dest.display()))?;
        let mut chunk = [0_u8; 64 * 1024];
        let mut downloaded = 0_u64;
        let start = Instant::now();
        let mut last_report = Instant::now();
        let use_tty_line = io::stderr().is_terminal();
        loop {
            let read = resp
                .read_chunk(&mut chunk)
                .with_context(|| format!("read bytes from `{url}`"))?;
            if read == 0 {
                break;
            }
            out.write_all(&chunk[..read])
                .with_context(|| format!("write downloaded file {}", dest.display()))?;
            downloaded = downloaded.saturating_add(read as u64);
            report_download_progress(
                downloaded,
                total_bytes,
                start.elapsed(),
                &mut last_report,
                false,
                use_tty_line,
            );
        }
        report_download_progress(
            downloaded,
            total_bytes,
            start.elapsed(),
            &mut last_report,
            true,
            use_tty_line,
        );
        out.flush()
            .with_context(|| format!("flush downloaded file {}", dest.display()))?;
        Ok(downloaded)
    }
}

/// A fetched file; its temp directory is removed on drop.
#[derive(Debug)]
pub(crate) struct DownloadTarget {
    pub(crate) url: String,
    pub(crate) file_name: String,
    pub(crate) local_path: PathBuf,
    cleanup_root: Option<PathBuf>,
}

impl Drop for DownloadTarget {
    fn drop(&mut self) {
        if let Some(root) = &self.cleanup_root {
            let _ = fs::remove_dir_all(root);
        }
    }
}

pub(crate) fn download_sdk(
    version: &str,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<DownloadTarget> {
    let url = build_sdk_url(version, facts, endpoints);
    let file_name = build_sdk_filename(version, facts);
    fetch(remote, facts, url, file_name, "vulkan-sdk-download")
}

pub(crate) fn download_runtime(
    version: &str,
    facts: &PlatformFacts,
    endpoints: &Endpoints,
    remote: &dyn Remote,
) -> Result<DownloadTarget> {
    let url = build_runtime_url(version, facts, endpoints).ok_or_else(|| {
        anyhow!(
            "runtime components are only published for Windows, not `{}`",
            facts.canonical_name()
        )
    })?;
    let file_name = download_filename(&url)?;
    fetch(remote, facts, url, file_name, "vulkan-runtime-download")
}

fn fetch(
    remote: &dyn Remote,
    facts: &PlatformFacts,
    url: String,
    file_name: String,
    temp_prefix: &str,
) -> Result<DownloadTarget> {
    if let Err(err) = remote.probe(&url) {
        actions::error(&format!("download URL is not reachable: {err:#}"));
    }

    let root = unique_temp_dir(&facts.temp_dir, temp_prefix)?;
    let target = DownloadTarget {
        local_path: root.join(&file_name),
        url,
        file_name,
        cleanup_root: Some(root),
    };
    println!("⬇️  Downloading {} ...", target.url);
    let bytes = remote
        .download(&target.url, &target.local_path)
        .with_context(|| format!("download `{}`", target.url))?;
    println!(
        "📥 Downloaded {} ({})",
        target.file_name,
        format_bytes_u64(bytes)
    );
    Ok(target)
}

const HTTPS_PROXY_ENV_KEYS: [&str; 6] = [
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
    "HTTP_PROXY",
    "http_proxy",
];
const HTTP_PROXY_ENV_KEYS: [&str; 4] = ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"];

pub(super) fn proxy_env_keys_for_scheme(scheme: &str) -> &'static [&'static str] {
    if scheme.eq_ignore_ascii_case("https") {
        &HTTPS_PROXY_ENV_KEYS
    } else {
        &HTTP_PROXY_ENV_KEYS
    }
}

fn first_env_value(names: &[&str]) -> Option<(String, String)> {
    for name in names {
        let Ok(value) = env::var(name) else {
            continue;
        };
        let value = value.trim();
        if !value.is_empty() {
            return Some(((*name).to_string(), value.to_string()));
        }
    }
    None
}

pub(super) fn split_no_proxy_rules(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|rule| !rule.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn apply_proxy_from_env(mut builder: ClientBuilder, scheme: &str) -> Result<ClientBuilder> {
    let Some((proxy_var, proxy_value)) = first_env_value(proxy_env_keys_for_scheme(scheme)) else {
        return Ok(builder);
    };

    let proxy_uri = proxy_value
        .parse()
        .with_context(|| format!("invalid proxy URI in `{proxy_var}`"))?;
    builder = builder.http_proxy(proxy_uri);

    if let Some((_, no_proxy_raw)) = first_env_value(&["NO_PROXY", "no_proxy"]) {
        let rules = split_no_proxy_rules(&no_proxy_raw);
        if !rules.is_empty() {
            builder = builder
                .try_no_proxy(rules)
                .context("invalid `NO_PROXY`/`no_proxy` rules")?;
        }
    }

    Ok(builder)
}

/// Shape of a request, which decides whether it gets a wall-clock cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestKind {
    Metadata,
    Download,
}

/// Overall deadline for a request of `kind`.
///
/// SDK installers run to hundreds of MiB, so downloads are bounded only by
/// the per-attempt timeout and may take as long as the transfer needs.
pub(crate) fn total_timeout_for(kind: RequestKind, timeout: Duration) -> Option<Duration> {
    match kind {
        RequestKind::Metadata => Some(timeout),
        RequestKind::Download => None,
    }
}

fn build_http_client(base_url: &str, timeout: Duration, kind: RequestKind) -> Result<Client> {
    let mut builder = Client::builder(base_url)
        .request_timeout(timeout)
        .retry_policy(RetryPolicy::disabled())
        .redirect_policy(RedirectPolicy::follow())
        .client_name(CLIENT_NAME);
    if let Some(total) = total_timeout_for(kind, timeout) {
        builder = builder.total_timeout(total);
    }
    let scheme = base_url
        .split_once("://")
        .map(|(s, _)| s)
        .unwrap_or("https");
    builder = apply_proxy_from_env(builder, scheme)
        .with_context(|| format!("configure HTTP client proxy for `{base_url}`"))?;
    builder
        .build()
        .with_context(|| format!("build HTTP client for `{base_url}`"))
}

pub(super) fn download_filename(url: &str) -> Result<String> {
    Ok(parse_url_parts(url)?.file_name)
}

#[derive(Debug)]
struct UrlParts {
    base_url: String,
    path_and_query: String,
    file_name: String,
}

fn parse_url_parts(url: &str) -> Result<UrlParts> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| anyhow!("invalid URL `{url}`: missing scheme"))?;
    if scheme != "http" && scheme != "https" {
        bail!("unsupported URL scheme `{scheme}` in `{url}`");
    }

    let slash_idx = rest.find('/').unwrap_or(rest.len());
    let authority = &rest[..slash_idx];
    if authority.is_empty() {
        bail!("invalid URL `{url}`: missing host");
    }

    let path_with_query_and_fragment = if slash_idx < rest.len() {
        &rest[slash_idx..]
    } else {
        "/"
    };
    let path_and_query = path_with_query_and_fragment
        .split('#')
        .next()
        .unwrap_or(path_with_query_and_fragment)
        .to_string();
    let path_only = path_and_query
        .split('?')
        .next()
        .unwrap_or(path_and_query.as_str());

    let file_name = path_only
        .rsplit('/')
        .find(|part| !part.is_empty())
        .ok_or_else(|| anyhow!("URL path has no file name: `{url}`"))?
        .to_string();

    Ok(UrlParts {
        base_url: format!("{scheme}://{authority}"),
        path_and_query: if path_and_query.is_empty() {
            "/".to_string()
        } else {
            path_and_query
        },
        file_name,
    })
}

fn format_bytes_u64(bytes: u64) -> String {
    format_bytes_f64(bytes as f64)
}

fn format_bytes_f64(bytes: f64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes.max(0.0);
    let mut idx = 0usize;
    while value >= 1024.0 && idx < UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    if idx == 0 {
        format!("{value:.0} {}", UNITS[idx])
    } else {
        format!("{value:.1} {}", UNITS[idx])
    }
}

pub(super) fn render_download_progress(
    downloaded: u64,
    total_bytes: Option<u64>,
    elapsed: Duration,
) -> String {
    let rate = if elapsed.is_zero() {
        0.0
    } else {
        downloaded as f64 / elapsed.as_secs_f64()
    };

    match total_bytes {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64 * 100.0).clamp(0.0, 100.0);
            format!(
                "⬇️  Downloaded {} / {} ({pct:.1}%, {}/s)",
                format_bytes_u64(downloaded),
                format_bytes_u64(total),
                format_bytes_f64(rate)
            )
        }
        _ => format!(
            "⬇️  Downloaded {} ({}/s)",
            format_bytes_u64(downloaded),
            format_bytes_f64(rate)
        ),
    }
}

fn report_download_progress(
    downloaded: u64,
    total_bytes: Option<u64>,
    elapsed: Duration,
    last_report: &mut Instant,
    force: bool,
    tty_line: bool,
) {
    let now = Instant::now();
    if !force && now.duration_since(*last_report) < Duration::from_secs(1) {
        return;
    }
    let line = render_download_progress(downloaded, total_bytes, elapsed);
    if tty_line {
        if force {
            eprint!("\r{line}\n");
        } else {
            eprint!("\r{line}");
            let _ = io::stderr().flush();
        }
    } else {
        eprintln!("{line}");
    }
    *last_report = now;
}

fn truncate_for_log(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    let mut out = String::new();
    for c in input.chars().take(max_chars.saturating_sub(1)) {
        out.push(c);
    }
    out.push('…');
    out
}
