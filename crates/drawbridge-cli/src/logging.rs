//! Logging setup from the `logging` config section.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use drawbridge_core::config::LoggingConfig;

/// Filter directives: `RUST_LOG` wins unless `--verbose` is given.
fn filter_directives(logging: Option<&LoggingConfig>, verbose: bool) -> String {
    let level = if verbose {
        "debug"
    } else {
        logging.and_then(|l| l.level.as_deref()).unwrap_or("info")
    };
    let mut directives = vec![level.to_string()];
    if let Some(logging) = logging {
        directives.extend(logging.filters.iter().cloned());
    }
    directives.join(",")
}

fn build_filter(logging: Option<&LoggingConfig>, verbose: bool) -> EnvFilter {
    if !verbose {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
    }
    let directives = filter_directives(logging, verbose);
    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Invalid log filter '{directives}': {e}, falling back to info");
        EnvFilter::new("info")
    })
}

/// Install the global subscriber.
pub fn init(logging: Option<&LoggingConfig>, verbose: bool) {
    let filter = build_filter(logging, verbose);
    let writer = match logging.map(|l| l.output.as_str()) {
        Some("stdout") => BoxMakeWriter::new(std::io::stdout),
        _ => BoxMakeWriter::new(std::io::stderr),
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);

    if logging.is_some_and(|l| l.format == "json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logging(level: Option<&str>, filters: &[&str]) -> LoggingConfig {
        LoggingConfig {
            format: "plain".into(),
            level: level.map(String::from),
            filters: filters.iter().map(|f| f.to_string()).collect(),
            output: "stderr".into(),
        }
    }

    #[test]
    fn test_defaults_to_info() {
        assert_eq!(filter_directives(None, false), "info");
    }

    #[test]
    fn test_level_and_filters() {
        let config = logging(Some("warn"), &["drawbridge_gateway=debug", "tower_http=info"]);
        assert_eq!(
            filter_directives(Some(&config), false),
            "warn,drawbridge_gateway=debug,tower_http=info"
        );
    }

    #[test]
    fn test_verbose_overrides_level() {
        let config = logging(Some("error"), &["hyper=warn"]);
        assert_eq!(filter_directives(Some(&config), true), "debug,hyper=warn");
    }
}
