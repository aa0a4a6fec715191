//! `turngraph config`: Print configuration as TOML.

use turngraph_config::AppConfig;

pub fn run(current: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !current {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }

    println!(
        "# {}",
        AppConfig::config_dir().join("config.toml").display()
    );
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
