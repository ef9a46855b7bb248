//! Config command implementation.

use std::fs;
use std::path::PathBuf;

use cpuproc::config::Config;

use crate::cli::ConfigFormat;

/// Serializes a configuration in the requested format.
pub fn render_config(config: &Config, format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Generates configuration files
pub fn command_config(output: Option<PathBuf>, format: ConfigFormat) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| {
        PathBuf::from(match format {
            ConfigFormat::Yaml => "cpuproc.yaml",
            ConfigFormat::Json => "cpuproc.json",
            ConfigFormat::Toml => "cpuproc.toml",
        })
    });

    let content = render_config(&config, format)?;

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cpuproc::config::parse_config;

    #[test]
    fn test_rendered_config_parses_back() {
        let cfg = Config::default();
        for (format, ext) in [
            (ConfigFormat::Yaml, "yaml"),
            (ConfigFormat::Json, "json"),
            (ConfigFormat::Toml, "toml"),
        ] {
            let text = render_config(&cfg, format).unwrap();
            let parsed = parse_config(&text, Some(ext)).unwrap();
            assert_eq!(parsed.samples, cfg.samples);
            assert_eq!(parsed.interval_ms, cfg.interval_ms);
        }
    }
}
