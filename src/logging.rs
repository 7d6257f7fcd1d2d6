//! Global logger setup.
//!
//! `RUST_LOG` picks the filter (default `info`); the line format comes from
//! settings. Output goes to stderr so transcript lines on stdout stay clean.

use std::io::Write;
use std::sync::Once;

use chrono::Utc;
use serde::{Deserialize, Serialize};

static INIT: Once = Once::new();

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

fn format_line(format: LogFormat, ts: &str, record: &log::Record<'_>) -> String {
    match format {
        LogFormat::Json => serde_json::json!({
            "ts": ts,
            "level": record.level().to_string(),
            "target": record.target(),
            "msg": record.args().to_string(),
        })
        .to_string(),
        LogFormat::Text => format!(
            "{} {} {} {}",
            ts,
            record.level(),
            record.target(),
            record.args()
        ),
    }
}

/// Install the global logger. Later calls are no-ops.
pub fn init(format: LogFormat) {
    INIT.call_once(|| {
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        builder.format(move |buf, record| {
            let ts = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            writeln!(buf, "{}", format_line(format, &ts, record))
        });
        builder.target(env_logger::Target::Stderr);

        // Another logger may already be installed (tests)
        let _ = builder.try_init();
    });
}
