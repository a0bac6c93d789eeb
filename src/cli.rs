use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI parser
#[derive(Parser)]
#[command(name = "vulkan-sdk-setup", version)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Sub-command definitions
#[derive(Subcommand)]
pub enum Commands {
    /// Install the Vulkan SDK and export its environment
    Install(InstallArgs),
    /// Print the resolved version and download URLs without installing
    Url {
        #[arg(long, env = "INPUT_VULKAN_VERSION")]
        version: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// List SDK versions published for this platform
    Versions {
        #[command(flatten)]
        common: CommonArgs,
    },
}

/// Options shared by every sub-command.
#[derive(Args, Clone, Debug, Default)]
pub struct CommonArgs {
    /// TOML file with defaults and endpoint overrides
    #[arg(long, env = "VULKAN_SDK_SETUP_CONFIG")]
    pub config: Option<PathBuf>,
    /// HTTP request timeout, e.g. `300s` or `5m`
    #[arg(long, env = "INPUT_HTTP_TIMEOUT")]
    pub http_timeout: Option<String>,
}

#[derive(Args, Clone, Debug, Default)]
pub struct InstallArgs {
    /// SDK version (`latest` or `major.minor.patch.rev`)
    #[arg(long, env = "INPUT_VULKAN_VERSION")]
    pub version: Option<String>,
    /// Install root
    #[arg(long, env = "INPUT_DESTINATION")]
    pub destination: Option<PathBuf>,
    /// Also install the runtime components (Windows only)
    #[arg(long, env = "INPUT_INSTALL_RUNTIME", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag_input)]
    pub install_runtime: Option<bool>,
    /// Restore from and save to the SDK cache
    #[arg(long, env = "INPUT_CACHE", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag_input)]
    pub cache: Option<bool>,
    /// Comma-separated installer components
    #[arg(long, env = "INPUT_OPTIONAL_COMPONENTS")]
    pub optional_components: Option<String>,
    /// Remove demos, licenses and installer leftovers before caching (Windows only)
    #[arg(long, env = "INPUT_STRIPDOWN", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag_input)]
    pub stripdown: Option<bool>,
    /// Fail the run when the installer or a verification probe fails
    #[arg(long, env = "INPUT_STRICT", action = ArgAction::Set, num_args = 0..=1, default_missing_value = "true", value_parser = parse_flag_input)]
    pub strict: Option<bool>,
    /// Directory holding cache entries
    #[arg(long, env = "INPUT_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
    /// Pause after runtime extraction, e.g. `3s`
    #[arg(long, env = "INPUT_RUNTIME_SETTLE_DELAY")]
    pub runtime_settle_delay: Option<String>,
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Bool-like CI input: true when it contains `true`, ignoring case.
pub fn parse_flag_input(raw: &str) -> Result<bool, String> {
    Ok(raw.to_ascii_lowercase().contains("true"))
}
