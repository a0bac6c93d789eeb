//! CI host primitives: log annotations and environment/output export.
//!
//! Speaks the GitHub Actions workflow-command protocol. Off-CI (no
//! `GITHUB_ENV`/`GITHUB_PATH`/`GITHUB_OUTPUT`) exports degrade to plain
//! `export` lines on stdout so a shell can still pick them up.

use anyhow::{Context, Result};
use std::{
    env,
    fs::OpenOptions,
    io::Write,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

const ENV_FILE_VAR: &str = "GITHUB_ENV";
const PATH_FILE_VAR: &str = "GITHUB_PATH";
const OUTPUT_FILE_VAR: &str = "GITHUB_OUTPUT";

pub fn warning(message: &str) {
    println!("::warning::{}", escape_data(message));
}

pub fn error(message: &str) {
    println!("::error::{}", escape_data(message));
}

/// Run `f` inside a collapsible log group. The group is closed on error too.
pub fn grouped<T>(title: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    println!("::group::{}", escape_data(title));
    let result = f();
    println!("::endgroup::");
    result
}

/// Export `name=value` to every later step of the job.
pub fn export_variable(name: &str, value: &str) -> Result<()> {
    match env::var_os(ENV_FILE_VAR) {
        Some(file) => write_env_file_entry(Path::new(&file), name, value),
        None => {
            println!("export {name}={}", shell_quote(value));
            Ok(())
        }
    }
}

/// Prepend `dir` to `PATH` for every later step of the job.
pub fn add_path(dir: &Path) -> Result<()> {
    match env::var_os(PATH_FILE_VAR) {
        Some(file) => append_line(Path::new(&file), &dir.display().to_string()),
        None => {
            println!(
                "export PATH={}",
                shell_quote(&format!("{}:$PATH", dir.display()))
            );
            Ok(())
        }
    }
}

/// Publish a step output.
pub fn set_output(name: &str, value: &str) -> Result<()> {
    match env::var_os(OUTPUT_FILE_VAR) {
        Some(file) => write_env_file_entry(Path::new(&file), name, value),
        None => Ok(()),
    }
}

pub(crate) fn write_env_file_entry(file: &Path, name: &str, value: &str) -> Result<()> {
    if !value.contains('\n') && !value.contains('\r') {
        return append_line(file, &format!("{name}={value}"));
    }
    let delimiter = format!(
        "ghadelimiter_{}_{}",
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    );
    append_line(file, &format!("{name}<<{delimiter}\n{value}\n{delimiter}"))
}

fn append_line(file: &Path, line: &str) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .with_context(|| format!("open CI file {}", file.display()))?;
    writeln!(f, "{line}").with_context(|| format!("write CI file {}", file.display()))?;
    Ok(())
}

pub(crate) fn escape_data(message: &str) -> String {
    message
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn shell_quote(value: &str) -> String {
    if value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-:$".contains(c))
    {
        return value.to_string();
    }
    format!("\"{}\"", value.replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn escape_data_encodes_control_characters() {
        assert_eq!(escape_data("50% done\r\nnext"), "50%25 done%0D%0Anext");
    }

    #[test]
    fn env_file_entries_use_heredoc_for_multiline_values() {
        let file = env::temp_dir().join(format!(
            "vulkan-sdk-setup-actions-{}-{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time")
                .as_nanos()
        ));
        write_env_file_entry(&file, "VULKAN_VERSION", "1.4.304.0").expect("write single");
        write_env_file_entry(&file, "NOTES", "a\nb").expect("write multiline");

        let content = fs::read_to_string(&file).expect("read env file");
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("VULKAN_VERSION=1.4.304.0"));
        let header = lines.next().expect("heredoc header");
        let delimiter = header.strip_prefix("NOTES<<").expect("heredoc marker");
        assert_eq!(lines.next(), Some("a"));
        assert_eq!(lines.next(), Some("b"));
        assert_eq!(lines.next(), Some(delimiter));
        let _ = fs::remove_file(file);
    }

    #[test]
    fn shell_quote_wraps_values_with_spaces() {
        assert_eq!(shell_quote("/opt/vulkan/bin"), "/opt/vulkan/bin");
        assert_eq!(shell_quote("C:\\Vulkan SDK"), "\"C:\\Vulkan SDK\"");
    }
}
