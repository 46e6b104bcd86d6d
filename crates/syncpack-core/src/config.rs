use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archive::ArchiveStore;
use crate::pipeline::PackRequest;

/// Environment variable that overrides the content root.
pub const ROOT_ENV: &str = "SYNCPACK_ROOT";

/// Filesystem layout
#[derive(Debug, Clone)]
pub struct Config {
    /// Content root (~/.local/share/syncpack)
    pub content_root: PathBuf,
    /// Archived packs ({root}/uSync/Exports)
    pub exports_dir: PathBuf,
    /// Per-operation working folders ({root}/uSync/Temp/Import)
    pub working_dir: PathBuf,
    /// Pipeline settings file
    pub settings_file: PathBuf,
}

impl Config {
    /// Load configuration or use defaults
    pub fn load_or_default() -> Self {
        let root = std::env::var_os(ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("syncpack")
            });
        Self::with_root(root)
    }

    pub fn with_root(content_root: impl Into<PathBuf>) -> Self {
        let content_root = content_root.into();
        let usync = content_root.join("uSync");

        Self {
            exports_dir: usync.join("Exports"),
            working_dir: usync.join("Temp").join("Import"),
            settings_file: content_root.join("syncpack.json"),
            content_root,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.content_root)?;
        std::fs::create_dir_all(&self.exports_dir)?;
        std::fs::create_dir_all(&self.working_dir)?;
        Ok(())
    }

    pub fn archive_store(&self) -> ArchiveStore {
        ArchiveStore::new(&self.exports_dir, &self.working_dir)
    }
}

/// Server-side pipeline settings. These always win over values a caller
/// puts on a pack request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackConfig {
    /// Handler set used to serialize items
    pub handler_set: String,
    /// Items processed per page
    pub page_size: u32,
    /// When set, no folders are included in packs at all
    pub no_folder: bool,
    /// Extra folders merged into every pack
    pub additional_folders: Vec<String>,
    /// System files never included
    pub exclusions: Vec<String>,
    /// File replacement rules, passed through in order
    pub replacements: Vec<String>,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            handler_set: "Default".to_string(),
            page_size: 50,
            no_folder: false,
            additional_folders: Vec::new(),
            exclusions: Vec::new(),
            replacements: Vec::new(),
        }
    }
}

impl PackConfig {
    /// Load settings from a JSON file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read settings {:?}: {}", path, e);
                }
                return Self::default();
            }
        };

        match serde_json::from_str::<PackConfig>(&content) {
            Ok(config) => config.normalized(),
            Err(e) => {
                tracing::warn!("Invalid settings {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }

    fn normalized(mut self) -> Self {
        self.page_size = self.page_size.max(1);
        self
    }

    /// Overwrite the server-controlled fields of a pack request.
    pub fn apply(&self, request: &mut PackRequest) {
        request.handler_set = self.handler_set.clone();
        request.page_size = self.page_size.max(1);

        if self.no_folder {
            request.options.folders.clear();
            return;
        }

        merge_and_clean(&mut request.options.folders, &self.additional_folders);
        merge_and_clean(&mut request.options.system_exclusions, &self.exclusions);
        request.options.file_replacements = self.replacements.clone();
    }
}

/// Append `incoming` to `target`, trimming entries and dropping blanks and
/// case-insensitive duplicates. Existing order is kept.
pub fn merge_and_clean(target: &mut Vec<String>, incoming: &[String]) {
    let mut merged: Vec<String> = Vec::with_capacity(target.len() + incoming.len());

    for value in target.iter().chain(incoming.iter()) {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if merged.iter().any(|existing| existing.eq_ignore_ascii_case(value)) {
            continue;
        }
        merged.push(value.to_string());
    }

    *target = merged;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_layout_under_root() {
        let config = Config::with_root("/srv/site");
        assert_eq!(config.exports_dir, PathBuf::from("/srv/site/uSync/Exports"));
        assert_eq!(
            config.working_dir,
            PathBuf::from("/srv/site/uSync/Temp/Import")
        );
    }

    #[test]
    fn test_merge_and_clean() {
        let mut target = strings(&["wwwroot/css", " ", "Views"]);
        merge_and_clean(&mut target, &strings(&["views", "wwwroot/js ", ""]));
        assert_eq!(target, strings(&["wwwroot/css", "Views", "wwwroot/js"]));
    }

    #[test]
    fn test_apply_overrides_caller_values() {
        let config = PackConfig {
            handler_set: "Exporter".to_string(),
            page_size: 20,
            additional_folders: strings(&["media"]),
            exclusions: strings(&["web.config"]),
            replacements: strings(&["old=new"]),
            ..Default::default()
        };

        let mut request = PackRequest::default();
        request.handler_set = "Caller".to_string();
        request.page_size = 1000;
        request.options.folders = strings(&["css"]);
        request.options.file_replacements = strings(&["mine"]);

        config.apply(&mut request);

        assert_eq!(request.handler_set, "Exporter");
        assert_eq!(request.page_size, 20);
        assert_eq!(request.options.folders, strings(&["css", "media"]));
        assert_eq!(request.options.system_exclusions, strings(&["web.config"]));
        assert_eq!(request.options.file_replacements, strings(&["old=new"]));
    }

    #[test]
    fn test_apply_no_folder_clears_folders() {
        let config = PackConfig {
            no_folder: true,
            additional_folders: strings(&["media"]),
            ..Default::default()
        };

        let mut request = PackRequest::default();
        request.options.folders = strings(&["css"]);
        config.apply(&mut request);

        assert!(request.options.folders.is_empty());
        assert_eq!(request.page_size, 50);
    }

    #[test]
    fn test_load_settings() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("syncpack.json");

        // Missing file
        assert_eq!(PackConfig::load(&path), PackConfig::default());

        std::fs::write(&path, r#"{ "handlerSet": "Exporter", "pageSize": 0 }"#).unwrap();
        let config = PackConfig::load(&path);
        assert_eq!(config.handler_set, "Exporter");
        assert_eq!(config.page_size, 1);
        assert!(!config.no_folder);

        std::fs::write(&path, "not json").unwrap();
        assert_eq!(PackConfig::load(&path), PackConfig::default());
    }
}
