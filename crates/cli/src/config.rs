//! Configuration commands.
//!
//! Configuration is loaded from TOML files and merged with environment variables
//! prefixed with `ADREEL__`. For example, `ADREEL__SERVER__TIMEOUT_MS`
//! will override `server.timeout_ms` in the TOML file.

use std::fs;
use std::path::Path;

use adreel_common::settings::Settings;

use crate::error::CliError;
use crate::OutputFormat;

/// Load and merge configuration from TOML file with environment variables.
///
/// Returns the validated settings and their canonical TOML rendering.
pub(crate) fn load_and_merge_config(
    file: &Path,
    verbose: bool,
) -> Result<(Settings, String), CliError> {
    let content = fs::read_to_string(file).map_err(|source| CliError::ReadConfig {
        path: file.to_path_buf(),
        source,
    })?;

    if verbose {
        println!("Loading config from: {}", file.display());
        println!("Environment variables with ADREEL__ prefix will be merged");
    }

    let settings = Settings::from_toml_validated(&content)
        .map_err(|e| CliError::InvalidConfig(format!("{:?}", e)))?;

    let merged_toml = settings
        .to_canonical_toml()
        .map_err(|e| CliError::Output(format!("{e:?}")))?;

    Ok((settings, merged_toml))
}

/// Validate configuration file.
pub fn validate(file: &Path, verbose: bool) -> Result<(), CliError> {
    let (settings, merged_toml) = load_and_merge_config(file, verbose)?;

    println!("Configuration is valid");
    println!("  File: {}", file.display());
    println!("  Campaign server: {}", settings.server.campaign_url);
    println!("  Surfaces: {}", settings.surfaces.len());

    if verbose {
        let value: toml::Value = toml::from_str(&merged_toml)?;
        if let Some(table) = value.as_table() {
            println!("\nSections found:");
            for key in table.keys() {
                println!("  - [{}]", key);
            }
        }

        println!("\nSurfaces:");
        for surface in &settings.surfaces {
            println!(
                "  - {}/{}: refresh {} ms, {} static slots, ads {}",
                surface.normalized_account_id(),
                surface.normalized_campaign_id(),
                surface.refresh_interval_ms,
                surface.static_slots.len(),
                if surface.ad_processing {
                    "enabled"
                } else {
                    "disabled"
                }
            );
        }
    }

    Ok(())
}

/// Print the merged configuration.
pub fn show(file: &Path, format: OutputFormat, verbose: bool) -> Result<(), CliError> {
    let (settings, merged_toml) = load_and_merge_config(file, verbose)?;
    match format {
        OutputFormat::Toml => print!("{}", merged_toml),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&settings)?),
    }
    Ok(())
}
