//! CLI entrypoint and argument definitions for `dockerdns`.

use std::net::SocketAddr;

/// Top-level CLI parser. Everything the process needs is a single flat set
/// of flags — there is no subcommand split here, since there is only one
/// thing this binary does.
#[derive(Debug, clap::Parser)]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Config {
    /// Suffix appended to every container-derived name. A leading `.` is
    /// stripped if present.
    #[arg(long, env = "DOCKERDNS_DOMAIN")]
    pub domain: Option<String>,

    /// Address the UDP DNS responder binds to.
    #[arg(long, env = "DOCKERDNS_BIND", default_value = "0.0.0.0:53")]
    pub bind: SocketAddr,

    /// Upstream DNS servers for recursive fallback. Comma-separated; if
    /// empty, unknown names resolve to NOERROR with no answer instead of
    /// being forwarded.
    #[arg(long = "resolver", env = "DOCKERDNS_RESOLVERS", value_delimiter = ',')]
    pub resolvers: Vec<SocketAddr>,

    /// Address of the container runtime's API socket or URL. Defaults to
    /// the platform's usual Docker socket when unset.
    #[arg(long, env = "DOCKERDNS_RUNTIME_ENDPOINT")]
    pub runtime_endpoint: Option<String>,

    /// Only log errors.
    #[arg(short, long)]
    pub quiet: bool,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn domain(&self) -> Option<String> {
        self.domain.as_deref().map(|d| d.trim_start_matches('.').to_string())
    }
}
