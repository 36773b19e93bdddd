use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_PORT: u16 = 4020;
pub const DEFAULT_BACKEND: &str = "http://localhost:8080";

#[derive(Debug, Parser)]
#[command(
    name = "certscope",
    version,
    about = "Inspect certificates, keys, chains and PKCS#12 bundles"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the inspection session over HTTP and WebSocket
    Serve(ServeArgs),
    /// Parse files from disk and print their decoded structure
    Inspect(InspectArgs),
}

#[derive(Debug, Clone, Args)]
pub struct BackendArgs {
    /// Base URL of the certificate parse service
    #[arg(long = "backend", env = "CERTSCOPE_BACKEND", default_value = DEFAULT_BACKEND)]
    pub url: String,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Listen port (falls back to API_PORT, then PORT)
    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Origin allowed to call the API cross-site
    #[arg(long)]
    pub allow_origin: Option<String>,

    #[command(flatten)]
    pub backend: BackendArgs,
}

impl ServeArgs {
    pub fn port(&self) -> u16 {
        self.port
            .or_else(|| env_port("API_PORT"))
            .or_else(|| env_port("PORT"))
            .unwrap_or(DEFAULT_PORT)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port())
    }
}

fn env_port(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Certificate, key, chain or PKCS#12 files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Password for encrypted keys and PKCS#12 containers
    #[arg(long)]
    pub password: Option<String>,

    /// Tree path to show collapsed, e.g. root.certificates.0.subject
    #[arg(long = "collapse", value_name = "PATH")]
    pub collapse: Vec<String>,

    /// Print the validated bundle as JSON instead of the tree
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub backend: BackendArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inspect_collects_repeated_collapse_paths() {
        let cli = Cli::try_parse_from([
            "certscope",
            "inspect",
            "leaf.pem",
            "bundle.p12",
            "--password",
            "secret",
            "--collapse",
            "root.certificates.0.subject",
            "--collapse",
            "root.certificates.0.issuer",
            "--backend",
            "http://parser:9000",
        ])
        .unwrap();
        let Command::Inspect(args) = cli.command else {
            panic!("expected inspect");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.password.as_deref(), Some("secret"));
        assert_eq!(args.collapse.len(), 2);
        assert_eq!(args.backend.url, "http://parser:9000");
        assert!(!args.json);
    }

    #[test]
    fn inspect_requires_files() {
        assert!(Cli::try_parse_from(["certscope", "inspect"]).is_err());
    }

    #[test]
    fn explicit_port_wins() {
        let argv = ["certscope", "serve", "--port", "9443", "--bind", "127.0.0.1"];
        let cli = Cli::try_parse_from(argv).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.addr(), "127.0.0.1:9443");
    }
}
