use tracing::Level;

/// Installs the process-wide `fmt` subscriber at `level`, the value of
/// `[logging] level`. Only the first call has an effect.
pub fn init(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(parse_level(level))
        .with_target(false)
        .try_init();
}

/// Level names are matched case-insensitively, `warning` included.
/// Anything unrecognised logs at `info`.
pub(crate) fn parse_level(level: &str) -> Level {
    let level = level.trim();
    if level.eq_ignore_ascii_case("warning") {
        return Level::WARN;
    }
    level.parse().unwrap_or(Level::INFO)
}
