//! Import settings read from an INI file.
//!
//! Keys and section names are case-insensitive. Blank values read as
//! absent, so `user_id =` falls back the same way a missing key does.

use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::domain::error::ImportError;
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    ini: Ini,
}

impl Default for FileConfigAdapter {
    fn default() -> Self {
        FileConfigAdapter { ini: Ini::new() }
    }
}

impl FileConfigAdapter {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ImportError> {
        let path = path.as_ref();
        let mut ini = Ini::new();
        ini.load(path).map_err(|reason| ImportError::ConfigParse {
            file: path.display().to_string(),
            reason,
        })?;
        debug!(path = %path.display(), sections = ini.sections().len(), "loaded config");
        Ok(FileConfigAdapter { ini })
    }

    pub fn from_string(content: &str) -> Result<Self, ImportError> {
        let mut ini = Ini::new();
        ini.read(content.to_string())
            .map_err(|reason| ImportError::ConfigParse {
                file: "<inline>".to_string(),
                reason,
            })?;
        Ok(FileConfigAdapter { ini })
    }

    fn value(&self, section: &str, key: &str) -> Option<String> {
        self.ini
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parsed<T: FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.value(section, key)?.parse().ok()
    }
}

fn flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.value(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.parsed(section, key).unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.value(section, key)
            .and_then(|v| flag(&v))
            .unwrap_or(default)
    }

    /// Sorted, lower-cased keys of a table section such as `[identifiers]`.
    fn keys(&self, section: &str) -> Vec<String> {
        let map = self.ini.get_map_ref();
        let mut keys: Vec<String> = match map.get(&section.to_lowercase()) {
            Some(entries) => entries.keys().cloned().collect(),
            None => Vec::new(),
        };
        keys.sort();
        keys
    }
}
