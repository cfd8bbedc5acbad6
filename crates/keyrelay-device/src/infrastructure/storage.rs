//! Config file loading.
//!
//! The format is chosen by extension: `*.toml` is parsed as TOML, anything
//! else (typically `config.txt` from older firmware) as legacy `key=value`
//! lines.  A missing file is not an error; the service starts on defaults
//! and `AppConfig::validate` reports what still has to be set.

use std::path::Path;

use tracing::{debug, info};

use crate::domain::config::{AppConfig, ConfigError};

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if a TOML file is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no config at {}; using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if is_toml(path) {
        debug!("reading TOML config from {}", path.display());
        Ok(toml::from_str(&content)?)
    } else {
        debug!("reading legacy key=value config from {}", path.display());
        Ok(AppConfig::from_legacy_str(&content))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("keyrelay-{}-{name}", std::process::id()));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("keyrelay-definitely-missing.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_toml_extension_is_parsed_as_toml() {
        // Arrange
        let path = temp_file(
            "storage.toml",
            "[auth]\nusername = \"admin\"\nuserpass = \"pw\"\n[http]\nport = 8080\n",
        );

        // Act
        let cfg = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(cfg.auth.username, "admin");
        assert_eq!(cfg.http.port, 8080);
    }

    #[test]
    fn test_other_extension_is_parsed_as_legacy() {
        let path = temp_file("config.txt", "username=admin\nuserpass=pw\npagename=kbd\n");

        let cfg = load_config(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.get("pagename"), "kbd");
        assert_eq!(cfg.http.page_path(), "/kbd");
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() {
        let path = temp_file("bad.toml", "[[[ nope");

        let result = load_config(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
