//! On-disk TOML configuration.
//!
//! All fields are optional so partial configs work; CLI flags always win
//! over file values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub endpoint: Option<String>,
    pub counter_db: Option<PathBuf>,
    pub supplier_prefix: Option<String>,
    pub output: Option<PathBuf>,
}

/// Platform config path: `<config_dir>/metacurate/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("metacurate").join("config.toml"))
}

/// Load config by cascading CWD `.metacurate.toml` over the platform file.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(".metacurate.toml"));
    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparseable config");
            None
        }
    }
}

/// `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        endpoint: overlay.endpoint.or(base.endpoint),
        counter_db: overlay.counter_db.or(base.counter_db),
        supplier_prefix: overlay.supplier_prefix.or(base.supplier_prefix),
        output: overlay.output.or(base.output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_wins_field_by_field() {
        let base = ConfigFile {
            endpoint: Some("https://base/sparql".into()),
            supplier_prefix: Some("070".into()),
            ..Default::default()
        };
        let overlay = ConfigFile {
            endpoint: Some("https://overlay/sparql".into()),
            counter_db: Some("counters.db".into()),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.endpoint.as_deref(), Some("https://overlay/sparql"));
        assert_eq!(merged.supplier_prefix.as_deref(), Some("070"));
        assert_eq!(merged.counter_db, Some(PathBuf::from("counters.db")));
    }

    #[test]
    fn partial_file_parses() {
        let config: ConfigFile = toml::from_str("endpoint = \"https://x/sparql\"").unwrap();
        assert_eq!(config.endpoint.as_deref(), Some("https://x/sparql"));
        assert!(config.counter_db.is_none());
    }
}
