//! Handler for the `config` command.

use std::path::PathBuf;

use crate::error::Result;

/// Render the effective lifecycle configuration as pretty JSON.
///
/// # Errors
///
/// Returns an error if the config cannot be loaded.
pub fn render(path: Option<&PathBuf>) -> Result<String> {
    let config = super::load_config(path)?;
    Ok(serde_json::to_string_pretty(&config.lifecycle)?)
}

/// Execute the config command.
pub fn execute(path: Option<&PathBuf>) -> Result<()> {
    println!("{}", render(path)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_defaults_without_a_file() {
        let json: serde_json::Value = serde_json::from_str(&render(None).unwrap()).unwrap();
        assert_eq!(json["max_connection_age_ms"], 3_600_000);
        assert_eq!(json["connection_timeout_ms"], 30_000);
    }

    #[test]
    fn missing_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/poolkeeper.toml");
        assert!(render(Some(&path)).is_err());
    }
}
