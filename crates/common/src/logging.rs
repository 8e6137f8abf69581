use error_stack::{Report, ResultExt};
use log::LevelFilter;

use crate::error::AdReelError;

/// Picks the log level for the host: `Debug` when any surface asked for it.
#[must_use]
pub fn level_for(debug: bool) -> LevelFilter {
    if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Initialize logging for the application.
/// Should be called once at the start of `main()`.
///
/// # Errors
///
/// Fails if a global logger has already been installed.
pub fn init_logging(level: LevelFilter) -> Result<(), Report<AdReelError>> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}  {} {} {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .change_context(AdReelError::Configuration {
            message: "Failed to initialize logger".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_debug_flag() {
        assert_eq!(level_for(true), LevelFilter::Debug);
        assert_eq!(level_for(false), LevelFilter::Info);
    }
}
