use std::{sync::Arc, thread};

use anyhow::Context;
use clap::Parser;

use dns_recursor::{
    config::Config,
    logging,
    message::Message,
    queue::MessageQueue,
    resolver::{upstream::UdpUpstream, Resolver},
    server,
};

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    logging::init(config.log_level.into(), config.log_target)
        .map_err(|err| anyhow::anyhow!(err))
        .context("Failed to initialise logging")?;

    tracing::info!("Starting dns-recursor v{}", env!("CARGO_PKG_VERSION"));

    let inbound: Arc<MessageQueue<Message>> =
        Arc::new(MessageQueue::new().context("Failed to create the inbound queue")?);
    let outbound: Arc<MessageQueue<Message>> =
        Arc::new(MessageQueue::new().context("Failed to create the outbound queue")?);

    let upstream =
        UdpUpstream::bind(config.upstream_timeout()).context("Failed to bind upstream socket")?;
    let resolver = Resolver::new(config.resolver_config(), upstream);

    {
        let inbound = Arc::clone(&inbound);
        let outbound = Arc::clone(&outbound);
        thread::Builder::new()
            .name("resolver".into())
            .spawn(move || resolver.run(&inbound, &outbound))
            .context("Failed to spawn the resolver thread")?;
    }
    tracing::info!("Resolver thread started");

    let listen = config.listen_addr();
    let network = thread::Builder::new()
        .name("network".into())
        .spawn(move || {
            let result = server::run(listen, inbound, outbound);
            if let Err(err) = &result {
                tracing::error!("Network thread stopped: {err}");
            }
            result
        })
        .context("Failed to spawn the network thread")?;
    tracing::info!("Network thread started");

    match network.join() {
        Ok(result) => result.with_context(|| format!("Failed to serve on {listen}")),
        Err(_) => anyhow::bail!("The network thread panicked"),
    }
}
