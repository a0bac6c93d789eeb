//! Cache keys and the directory-backed cache store.

use super::installer::install_path_for;
use super::platform::PlatformFacts;
use crate::command::actions;
use anyhow::{Context, Result, anyhow, bail};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    env,
    fs::{self, File, OpenOptions},
    io::{BufReader, Read},
    path::{Component, Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};
use tar::{Archive, Builder};

const CACHE_SCHEMA_VERSION: u32 = 1;
const LOCK_FILE: &str = ".cache.lock";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
const MANIFEST_SUFFIX: &str = ".json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheKey {
    pub(crate) primary: String,
    /// Most specific first.
    pub(crate) restore_fallbacks: [String; 2],
}

impl CacheKey {
    pub(crate) fn compute(platform: &str, arch: &str, version: &str) -> Self {
        let prefix = format!("cache-{platform}-{arch}-");
        let sdk_prefix = format!("{prefix}vulkan-sdk-");
        Self {
            primary: format!("{sdk_prefix}{version}"),
            restore_fallbacks: [sdk_prefix, prefix],
        }
    }
}

/// Paths saved under a key; Windows caches the versioned folder only.
pub(crate) fn cache_paths(facts: &PlatformFacts, destination: &Path, version: &str) -> Vec<PathBuf> {
    vec![install_path_for(facts, destination, version)]
}

pub(crate) trait CacheStore {
    /// Restore `paths` from the primary key or the newest entry matching a
    /// fallback prefix. Returns the key that was restored.
    fn restore(&self, paths: &[PathBuf], primary: &str, fallbacks: &[String])
    -> Result<Option<String>>;

    fn save(&self, paths: &[PathBuf], key: &str) -> Result<()>;
}

/// Restore failures are reported and treated as a miss.
pub(crate) fn restore_cache(
    store: &dyn CacheStore,
    paths: &[PathBuf],
    key: &CacheKey,
) -> Option<String> {
    println!("🔎 Looking up cache key {}", key.primary);
    match store.restore(paths, &key.primary, &key.restore_fallbacks) {
        Ok(Some(hit)) => {
            println!("♻️  Restored Vulkan SDK from cache key {hit}");
            Some(hit)
        }
        Ok(None) => {
            println!("ℹ️  Cache miss for {}", key.primary);
            None
        }
        Err(err) => {
            actions::warning(&format!("cache restore failed: {err:#}"));
            None
        }
    }
}

/// Save under the primary key only. Failures never fail the run.
pub(crate) fn save_cache(store: &dyn CacheStore, paths: &[PathBuf], key: &CacheKey) {
    match store.save(paths, &key.primary) {
        Ok(()) => println!("💾 Saved cache key {}", key.primary),
        Err(err) => actions::warning(&format!("cache save failed: {err:#}")),
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheManifest {
    schema_version: u32,
    key: String,
    paths: Vec<String>,
    created_at_unix_millis: u128,
    sha256: String,
    size_bytes: u64,
}

#[derive(Debug)]
pub(crate) struct DirCacheStore {
    root: PathBuf,
}

#[derive(Debug)]
struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl DirCacheStore {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// `--cache-dir`, else the runner tool cache, else `~/.cache`.
    pub(crate) fn default_root(facts: &PlatformFacts, explicit: Option<&Path>) -> PathBuf {
        if let Some(dir) = explicit {
            return dir.to_path_buf();
        }
        if let Some(tool_cache) = env::var_os("RUNNER_TOOL_CACHE").filter(|v| !v.is_empty()) {
            return PathBuf::from(tool_cache).join("vulkan-sdk-cache");
        }
        facts.home_dir.join(".cache").join("vulkan-sdk-setup")
    }

    fn archive_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{ARCHIVE_SUFFIX}", file_stem_for_key(key)))
    }

    fn manifest_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}{MANIFEST_SUFFIX}", file_stem_for_key(key)))
    }

    fn lock(&self) -> Result<CacheLock> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create cache directory {}", self.root.display()))?;
        let lock_path = self.root.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("open lock file {}", lock_path.display()))?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("acquire lock {}", lock_path.display()))?;
        Ok(CacheLock { file })
    }

    fn read_manifests(&self) -> Result<Vec<CacheManifest>> {
        let mut out = Vec::new();
        if !self.root.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("read cache directory {}", self.root.display()))?
        {
            let path = entry?.path();
            let is_manifest = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(MANIFEST_SUFFIX));
            if !is_manifest {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path) else {
                continue;
            };
            match serde_json::from_str::<CacheManifest>(&raw) {
                Ok(manifest) if manifest.schema_version == CACHE_SCHEMA_VERSION => {
                    out.push(manifest)
                }
                _ => continue,
            }
        }
        Ok(out)
    }

    fn find_entry(&self, primary: &str, fallbacks: &[String]) -> Result<Option<CacheManifest>> {
        let mut manifests = self.read_manifests()?;
        if let Some(idx) = manifests.iter().position(|m| m.key == primary) {
            return Ok(Some(manifests.swap_remove(idx)));
        }
        for prefix in fallbacks {
            let newest = manifests
                .iter()
                .enumerate()
                .filter(|(_, m)| m.key.starts_with(prefix.as_str()))
                .max_by(|(_, a), (_, b)| {
                    a.created_at_unix_millis
                        .cmp(&b.created_at_unix_millis)
                        .then_with(|| a.key.cmp(&b.key))
                })
                .map(|(idx, _)| idx);
            if let Some(idx) = newest {
                return Ok(Some(manifests.swap_remove(idx)));
            }
        }
        Ok(None)
    }
}

impl CacheStore for DirCacheStore {
    fn restore(
        &self,
        paths: &[PathBuf],
        primary: &str,
        fallbacks: &[String],
    ) -> Result<Option<String>> {
        if !self.root.is_dir() {
            return Ok(None);
        }
        let _lock = self.lock()?;
        let Some(manifest) = self.find_entry(primary, fallbacks)? else {
            return Ok(None);
        };
        if manifest.paths.len() != paths.len() {
            bail!(
                "cache entry {} holds {} path(s), expected {}",
                manifest.key,
                manifest.paths.len(),
                paths.len()
            );
        }

        let archive_path = self.archive_path(&manifest.key);
        let actual = sha256_file(&archive_path)?;
        if !actual.eq_ignore_ascii_case(&manifest.sha256) {
            bail!(
                "cache entry {} is corrupt: sha256 expected {}, got {}",
                manifest.key,
                manifest.sha256,
                actual
            );
        }
        unpack_entry(&archive_path, paths)
            .with_context(|| format!("unpack cache entry {}", manifest.key))?;
        Ok(Some(manifest.key))
    }

    fn save(&self, paths: &[PathBuf], key: &str) -> Result<()> {
        for path in paths {
            if !path.exists() {
                bail!("cannot cache missing path {}", path.display());
            }
        }
        let _lock = self.lock()?;
        let archive_path = self.archive_path(key);
        let manifest_path = self.manifest_path(key);
        if manifest_path.exists() && archive_path.exists() {
            println!("ℹ️  Cache key {key} already exists, not overwriting");
            return Ok(());
        }

        let tmp = archive_path.with_extension(format!("tmp-{}", std::process::id()));
        let packed = pack_entry(&tmp, paths);
        if let Err(err) = packed {
            let _ = fs::remove_file(&tmp);
            return Err(err.context(format!("pack cache entry {key}")));
        }
        let size_bytes = fs::metadata(&tmp)
            .with_context(|| format!("stat {}", tmp.display()))?
            .len();
        let manifest = CacheManifest {
            schema_version: CACHE_SCHEMA_VERSION,
            key: key.to_string(),
            paths: paths.iter().map(|p| p.display().to_string()).collect(),
            created_at_unix_millis: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            sha256: sha256_file(&tmp)?,
            size_bytes,
        };
        fs::rename(&tmp, &archive_path).with_context(|| {
            format!(
                "move cache archive {} -> {}",
                tmp.display(),
                archive_path.display()
            )
        })?;
        let content = serde_json::to_vec_pretty(&manifest).context("serialize cache manifest")?;
        fs::write(&manifest_path, content)
            .with_context(|| format!("write cache manifest {}", manifest_path.display()))?;
        Ok(())
    }
}

fn pack_entry(archive_path: &Path, paths: &[PathBuf]) -> Result<()> {
    let file = File::create(archive_path)
        .with_context(|| format!("create cache archive {}", archive_path.display()))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    for (idx, path) in paths.iter().enumerate() {
        builder
            .append_dir_all(idx.to_string(), path)
            .with_context(|| format!("archive {}", path.display()))?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

fn unpack_entry(archive_path: &Path, paths: &[PathBuf]) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("open cache archive {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(BufReader::new(file)));
    archive.set_preserve_permissions(true);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let mut components = entry_path.components();
        let idx = match components.next() {
            Some(Component::Normal(first)) => first
                .to_str()
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| anyhow!("unexpected cache entry {}", entry_path.display()))?,
            _ => bail!("unexpected cache entry {}", entry_path.display()),
        };
        let rest = components.as_path();
        if rest
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            bail!("unsafe cache entry {}", entry_path.display());
        }
        let root = paths
            .get(idx)
            .ok_or_else(|| anyhow!("cache entry {} has no target path", entry_path.display()))?;
        if rest.as_os_str().is_empty() {
            fs::create_dir_all(root)?;
            continue;
        }
        let target = root.join(rest);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .with_context(|| format!("restore {}", target.display()))?;
    }
    Ok(())
}

fn file_stem_for_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file
            .read(&mut buf)
            .with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
