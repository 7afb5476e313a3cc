use tracing_subscriber::EnvFilter;

/// Log level filter and line format, read from the environment.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSettings {
    pub filter: String,
    pub json: bool,
    pub ansi: bool,
}

impl LogSettings {
    pub fn from_env() -> Self {
        let filter = env_value("KLINE_SYNC_LOG")
            .or_else(|| env_value("RUST_LOG"))
            .unwrap_or_else(|| "info".to_string());
        let json = env_value("KLINE_SYNC_LOG_FORMAT").as_deref() == Some("json");
        let ansi = std::env::var_os("NO_COLOR").is_none();
        Self { filter, json, ansi }
    }
}

pub fn init() {
    init_with(&LogSettings::from_env());
}

pub fn init_with(settings: &LogSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.filter))
        .with_writer(std::io::stdout)
        .with_target(false);

    // A subscriber installed earlier (tests, embedding) wins.
    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(settings.ansi).try_init()
    };
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
