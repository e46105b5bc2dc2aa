use std::sync::Once;

use env_logger::WriteStyle;
use log::LevelFilter;

use crate::settings::LoggingSettings;

const DEFAULT_LEVEL: LevelFilter = LevelFilter::Info;

/// How [`init_logging`] sets up `env_logger`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` directives such as `"sprite_gl=debug"`. When set, this
    /// takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
    pub write_style: WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: None,
            write_style: WriteStyle::Auto,
        }
    }
}

/// A blank filter in the settings file leaves the choice to `RUST_LOG`.
impl From<&LoggingSettings> for LoggingConfig {
    fn from(settings: &LoggingSettings) -> Self {
        let filter = settings.filter.trim();
        Self {
            filter: (!filter.is_empty()).then(|| filter.to_owned()),
            ..Self::default()
        }
    }
}

/// Picks the directives to parse: configured filter, then `RUST_LOG`.
/// `None` means fall back to [`DEFAULT_LEVEL`].
fn filter_directives(configured: Option<&str>, env: Option<&str>) -> Option<String> {
    configured
        .or(env.filter(|value| !value.trim().is_empty()))
        .map(str::to_owned)
}

static INIT: Once = Once::new();

/// Installs `env_logger` as the global logger. Later calls, and hosts that
/// already installed a logger, are left alone.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let env = std::env::var("RUST_LOG").ok();
        let mut builder = env_logger::Builder::new();
        match filter_directives(config.filter.as_deref(), env.as_deref()) {
            Some(directives) => builder.parse_filters(&directives),
            None => builder.filter_level(DEFAULT_LEVEL),
        };
        builder.write_style(config.write_style);

        match builder.try_init() {
            Ok(()) => log::debug!("Logger installed"),
            Err(err) => log::debug!("Keeping existing logger: {}", err),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_settings() {
        let settings = LoggingSettings {
            filter: String::from(" sprite_gl=debug "),
        };
        let config = LoggingConfig::from(&settings);
        assert_eq!(config.filter.as_deref(), Some("sprite_gl=debug"));
    }

    #[test]
    fn test_blank_settings_filter_defers_to_env() {
        let config = LoggingConfig::from(&LoggingSettings::default());
        assert_eq!(config.filter, None);
        assert_eq!(
            filter_directives(config.filter.as_deref(), Some("warn")).as_deref(),
            Some("warn")
        );
    }

    #[test]
    fn test_filter_directives_precedence() {
        assert_eq!(
            filter_directives(Some("trace"), Some("warn")).as_deref(),
            Some("trace")
        );
        assert_eq!(filter_directives(None, Some("  ")), None);
        assert_eq!(filter_directives(None, None), None);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging(LoggingConfig::default());
        init_logging(LoggingConfig {
            filter: Some(String::from("trace")),
            ..LoggingConfig::default()
        });
        log::info!("still logging");
    }
}
