use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Install the global subscriber: a colorized console layer plus a
/// non-blocking rolling file layer under `logs/`.
///
/// Cycle events (target `cycle`) log at INFO on both layers; everything
/// else is WARN-to-file and ERROR-to-console so long sessions stay
/// readable. The returned guard must be kept alive or buffered file output
/// is lost on exit.
pub fn setup_logger() -> Option<WorkerGuard> {
    std::fs::create_dir_all("logs").ok();

    // Hourly rotation keeps the on-disk footprint bounded during long
    // spam sessions.
    let file_appender = tracing_appender::rolling::hourly("logs", "miner");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = tracing_subscriber::filter::Targets::new()
        .with_target("cycle", Level::INFO)
        .with_default(Level::WARN);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormat)
        .with_filter(file_filter);

    let console_filter = tracing_subscriber::filter::Targets::new()
        .with_target("cycle", Level::INFO)
        .with_default(Level::ERROR);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(ConsoleFormat)
        .with_filter(console_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .init();

    Some(guard)
}

/// Pulls the `message` field out of an event.
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

fn event_message(event: &Event<'_>) -> String {
    let mut visitor = MessageVisitor {
        message: String::new(),
    };
    event.record(&mut visitor);
    visitor.message
}

/// Console output: dim timestamp, message with outcome words highlighted.
struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%H:%M:%S");
        let message = highlight_outcomes(&event_message(event));

        let dim = Style::new().dimmed();
        writeln!(writer, "{} {}", dim.paint(timestamp.to_string()), message)
    }
}

fn highlight_outcomes(message: &str) -> String {
    let green = Style::new().fg(Color::LightGreen).bold();
    let red = Style::new().fg(Color::LightRed).bold();

    let mut out = message.to_string();
    for word in ["SUCCESS", "Success"] {
        if out.contains(word) {
            out = out.replace(word, &green.paint(word).to_string());
        }
    }
    for word in ["FAILED", "Failed"] {
        if out.contains(word) {
            out = out.replace(word, &red.paint(word).to_string());
        }
    }
    out
}

/// File output: full date, level, message. No ANSI.
struct FileFormat;

impl<S, N> FormatEvent<S, N> for FileFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        writeln!(writer, "{} [{}] {}", timestamp, level, event_message(event))
    }
}
