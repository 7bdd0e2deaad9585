use std::{error::Error, fmt};

use clap::ValueEnum;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogTarget {
    /// Human readable lines with timestamps.
    Console,
    /// One line per event, prefixed with the syslog priority as understood by journald.
    Systemd,
}

/// Install the global subscriber. Fails if one was installed already.
pub fn init(level: Level, target: LogTarget) -> Result<(), Box<dyn Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_max_level(level);
    match target {
        LogTarget::Console => builder.try_init(),
        LogTarget::Systemd => builder
            .with_ansi(false)
            .event_format(SystemdFormat)
            .try_init(),
    }
}

/// The sd-daemon priority prefix for `level`.
fn priority(level: Level) -> u8 {
    match level {
        Level::ERROR => 3,
        Level::WARN => 4,
        Level::INFO => 6,
        _ => 7,
    }
}

pub struct SystemdFormat;

impl<S, N> FormatEvent<S, N> for SystemdFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(
            writer,
            "<{}>{}: ",
            priority(*metadata.level()),
            metadata.target()
        )?;
        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
