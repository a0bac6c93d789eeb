//! Archive extraction and directory-tree helpers.

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tar::Archive;
use xz2::read::XzDecoder;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ArchiveFormat {
    TarGz,
    TarXz,
    Zip,
}

impl ArchiveFormat {
    pub(crate) fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
            Some(Self::TarXz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }
}

/// Extract `archive_path` into `dest_dir`. Returns once every entry is on disk.
pub(crate) fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let Some(format) = ArchiveFormat::from_file_name(&name) else {
        bail!("unsupported archive format: {}", archive_path.display());
    };
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("create extraction directory {}", dest_dir.display()))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {wide_msg}")?
            .tick_strings(&["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"]),
    );
    pb.set_message(format!("Extracting {name} to {}", dest_dir.display()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let result = match format {
        ArchiveFormat::TarGz => {
            let file = open_archive(archive_path)?;
            unpack_tar(GzDecoder::new(BufReader::new(file)), dest_dir)
        }
        ArchiveFormat::TarXz => {
            let file = open_archive(archive_path)?;
            unpack_tar(XzDecoder::new(BufReader::new(file)), dest_dir)
        }
        ArchiveFormat::Zip => extract_zip(archive_path, dest_dir),
    };
    pb.finish_and_clear();
    result.with_context(|| format!("extract archive {}", archive_path.display()))?;
    println!("📦 Extracted {name} to {}", dest_dir.display());
    Ok(())
}

fn open_archive(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("open archive {}", path.display()))
}

fn unpack_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(dest_dir)?;
    Ok(())
}

fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let file = open_archive(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("read zip {}", archive_path.display()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("read zip entry {i}"))?;
        let Some(entry_path) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            bail!("zip entry {i} has an unsafe path: {}", entry.name());
        };
        let out_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("create directory {}", out_path.display()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if entry.is_symlink() {
            let mut target = String::new();
            entry
                .read_to_string(&mut target)
                .with_context(|| format!("read link target of {}", entry.name()))?;
            if !link_stays_inside(&entry_path, Path::new(&target)) {
                bail!(
                    "zip entry {} links outside the archive: {target}",
                    entry.name()
                );
            }
            write_zip_symlink(&target, &out_path)?;
            continue;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("extract {}", out_path.display()))?;
        out.sync_all()
            .with_context(|| format!("flush {}", out_path.display()))?;

        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&out_path, fs::Permissions::from_mode(mode & 0o7777))?;
            }
        }
    }
    Ok(())
}

/// Whether `target`, read relative to the directory holding `entry_path`,
/// stays under the extraction root.
fn link_stays_inside(entry_path: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }
    let mut depth = entry_path.components().count().saturating_sub(1);
    for component in target.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let Some(up) = depth.checked_sub(1) else {
                    return false;
                };
                depth = up;
            }
            Component::Normal(_) => depth += 1,
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(unix)]
fn write_zip_symlink(target: &str, out_path: &Path) -> Result<()> {
    if fs::symlink_metadata(out_path).is_ok() {
        fs::remove_file(out_path).with_context(|| format!("replace {}", out_path.display()))?;
    }
    std::os::unix::fs::symlink(target, out_path)
        .with_context(|| format!("link {} -> {target}", out_path.display()))
}

#[cfg(not(unix))]
fn write_zip_symlink(target: &str, out_path: &Path) -> Result<()> {
    fs::write(out_path, target).with_context(|| format!("write {}", out_path.display()))
}

/// Copy the contents of `src` into `dst`.
///
/// Existing files in `dst` are overwritten. Symlinks are recreated as links
/// on Unix; elsewhere the link target is copied.
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("create directory {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("read dir {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let typ = entry.file_type()?;
        if typ.is_dir() {
            copy_dir_recursive(&from, &to)?;
        } else if typ.is_symlink() {
            copy_symlink(&from, &to)?;
        } else {
            fs::copy(&from, &to)
                .with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from).with_context(|| format!("read link {}", from.display()))?;
    if let Ok(meta) = fs::symlink_metadata(to) {
        if meta.is_dir() {
            fs::remove_dir_all(to)?;
        } else {
            fs::remove_file(to)?;
        }
    }
    std::os::unix::fs::symlink(&target, to)
        .with_context(|| format!("symlink {} -> {}", to.display(), target.display()))
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    if from.is_dir() {
        return copy_dir_recursive(from, to);
    }
    fs::copy(from, to).with_context(|| format!("copy {} -> {}", from.display(), to.display()))?;
    Ok(())
}

pub(crate) fn collect_dir_names(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    if !root.exists() {
        return Ok(out);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            out.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    out.sort();
    Ok(out)
}

/// First entry directly under `root` whose name satisfies `pred`.
pub(crate) fn find_child(root: &Path, pred: impl Fn(&str) -> bool) -> Result<Option<PathBuf>> {
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("read dir {}", root.display()))? {
        names.push(entry?.file_name().to_string_lossy().to_string());
    }
    names.sort();
    Ok(names
        .into_iter()
        .find(|name| pred(name))
        .map(|name| root.join(name)))
}
