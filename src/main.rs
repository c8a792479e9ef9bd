use anyhow::{Context, Result};
use loss_prevention_pipeline::config::AppConfig;
use loss_prevention_pipeline::pipeline;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = resolve_config(std::env::args().nth(1))?;
    init_logging(&config);

    let output_path = config.output.events.clone();
    let output = pipeline::run(config).await?;

    write_events(&output_path, &output.events)?;
    info!(path = %output_path, events = output.events.len(), "event log written");

    output.metrics.print_summary();
    Ok(())
}

/// Optional config path as the first argument. Built-in defaults apply only
/// when no argument is given and the default file does not exist; a config
/// file that fails to parse or validate is fatal.
fn resolve_config(arg: Option<String>) -> Result<AppConfig> {
    match arg {
        Some(path) => AppConfig::load_from_path(path),
        None => {
            if Path::new("config/config.toml").exists() {
                AppConfig::load()
            } else {
                Ok(AppConfig::default())
            }
        }
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn write_events(path: &str, events: &[loss_prevention_pipeline::FinalEvent]) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for event in events {
        serde_json::to_writer(&mut writer, event)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    if events.is_empty() {
        warn!("no events detected this run");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_invalid_config_file_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[detectors]\nshrinkage_threshold_pct = -1.0").unwrap();

        let result = resolve_config(Some(file.path().to_string_lossy().into_owned()));
        assert!(result.is_err());
    }

    #[test]
    fn test_explicitly_named_missing_config_is_fatal() {
        let result = resolve_config(Some("/nonexistent/config.toml".to_string()));
        assert!(result.is_err());
    }
}
