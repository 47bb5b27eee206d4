use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Installs the stderr subscriber.
///
/// Session events are printed by the drive loop itself, so at the default
/// verbosity the mirrored `nitro::events` records stay quiet.
pub fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn,nitro::events=off",
        1 => "info,nitro::events=off",
        _ => "debug",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(stderr)
        .with_target(true)
        .compact()
        .init();
}
