use std::sync::Arc;

use clap::Parser;

use dockerdns::commands::base::Cli;
use dockerdns::dns_server::{self, DnsServerConfig};
use dockerdns::ingest::Ingestor;
use dockerdns::registry::Registry;
use dockerdns::runtime::bollard_client::BollardRuntime;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();
    let config = cli.config;

    dockerdns::logging::init(config.quiet, config.verbose);

    let domain = config.domain();
    let registry = Arc::new(Registry::new(domain.clone()));

    let runtime = BollardRuntime::connect(config.runtime_endpoint.as_deref())
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
    let ingestor = Arc::new(Ingestor::new(runtime, registry.clone(), domain));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (bootstrapped_tx, bootstrapped_rx) = tokio::sync::oneshot::channel();
    let event_loop = {
        let ingestor = ingestor.clone();
        tokio::spawn(async move { ingestor.serve(shutdown_rx, bootstrapped_tx).await })
    };

    log::info!("[main] bootstrapping from currently-running containers");
    let _ = bootstrapped_rx.await;

    let dns_config = DnsServerConfig {
        bind: config.bind,
        resolvers: config.resolvers,
    };

    tokio::select! {
        result = dns_server::serve(dns_config, registry) => {
            if let Err(err) = result {
                log::error!("[main] DNS responder stopped: {}", err);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("[main] received interrupt, shutting down");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(err) = event_loop.await {
        log::error!("[main] event loop task panicked: {}", err);
    }
    Ok(())
}
