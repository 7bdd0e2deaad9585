use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroUsize,
    time::Duration,
};

use clap::{Parser, ValueEnum};

use crate::{
    logging::LogTarget,
    resolver::{
        upstream::{DNS_PORT, ROOT_SERVERS},
        ReferralPolicy, ResolverConfig,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "dns-recursor")]
#[command(version)]
#[command(about = "A small recursive DNS resolver with a TTL aware cache")]
pub struct Config {
    /// Address to listen on for client queries
    #[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub listen: IpAddr,

    /// UDP port to listen on
    #[arg(short, long, default_value_t = DNS_PORT)]
    pub port: u16,

    /// Maximum number of cached record sets
    #[arg(long, default_value = "4096")]
    pub cache_capacity: NonZeroUsize,

    /// How long to wait for a reply from an upstream server, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub upstream_timeout_ms: u64,

    /// Deepest CNAME nesting that is still resolved
    #[arg(long, default_value_t = 10)]
    pub max_depth: usize,

    /// Root server to start resolution at, may be repeated. Defaults to the IANA root servers
    #[arg(long = "root-server", value_name = "IP")]
    pub root_servers: Vec<Ipv4Addr>,

    /// Continue at the servers of a referral instead of skipping replies without answers
    #[arg(long)]
    pub follow_referrals: bool,

    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Where log lines go. `systemd` prefixes every line with its syslog priority
    #[arg(long, value_enum, default_value_t = LogTarget::Console)]
    pub log_target: LogTarget,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.port)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        let roots = if self.root_servers.is_empty() {
            &ROOT_SERVERS[..]
        } else {
            &self.root_servers[..]
        };
        ResolverConfig {
            cache_capacity: self.cache_capacity,
            max_depth: self.max_depth,
            root_servers: roots
                .iter()
                .map(|addr| SocketAddr::new(IpAddr::V4(*addr), DNS_PORT))
                .collect(),
            upstream_timeout: self.upstream_timeout(),
            referral_policy: if self.follow_referrals {
                ReferralPolicy::Follow
            } else {
                ReferralPolicy::Ignore
            },
        }
    }
}
