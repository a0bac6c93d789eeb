use anyhow::{Result, anyhow};
use clap::Parser;

mod cli;
mod command;

fn main() {
    if let Err(err) = run() {
        command::actions::error(&format!("{err:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    init_tls_crypto_provider()?;

    let args = cli::Cli::parse();
    match args.cmd {
        cli::Commands::Install(install) => command::install::run(install),
        cli::Commands::Url { version, common } => command::install::print_urls(version, common),
        cli::Commands::Versions { common } => command::install::print_versions(common),
    }
}

fn init_tls_crypto_provider() -> Result<()> {
    if rustls::crypto::CryptoProvider::get_default().is_none() {
        rustls::crypto::ring::default_provider()
            .install_default()
            .map_err(|_| anyhow!("failed to install rustls ring crypto provider"))?;
    }
    Ok(())
}
