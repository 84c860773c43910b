//! Module discovery: scanning repository trees for descriptor files.
//!
//! A module is a directory carrying a `*.tfmod` descriptor — a small JSON
//! record naming the module, its dependencies, and its test capabilities.
//! Scanning walks the repository with a plain recursive walker, skipping
//! hidden directories and `node_modules`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::error::{FleetError, Result};

/// Descriptor file extension marking a module directory.
pub const DESCRIPTOR_EXT: &str = "tfmod";

/// Raw contents of a `*.tfmod` descriptor file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleDescriptor {
    /// Module name; defaults to the directory name when omitted.
    pub name: Option<String>,
    /// Names of modules this module depends on, in declaration order.
    pub depends: Vec<String>,
    /// The module carries unit tests.
    pub unit_test: bool,
    /// The module's tests can only run headless, never browser-hosted.
    pub only_headless: bool,
    /// The module is a CDN-delivered asset bundle.
    pub for_cdn: bool,
    /// The module must be present in every build of its repository.
    pub required: bool,
    /// Stable identifier carried through builds; generated when omitted.
    pub id: Option<String>,
}

/// A module discovered during a repository scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Unique key within a run.
    pub name: String,
    /// Owning repository name.
    pub repository: String,
    /// Module directory.
    pub path: PathBuf,
    /// Declared dependency names; may reference modules the scan never
    /// discovers (closure traversal simply cannot descend into those).
    pub depends_on: Vec<String>,
    pub has_unit_test: bool,
    /// True when the owning repository allows browser runs and the
    /// descriptor is not marked headless-only.
    pub browser_capable: bool,
    pub is_cdn_asset: bool,
    pub is_required: bool,
    pub stable_id: String,
}

impl Module {
    /// Final path component — the segment changed paths are matched
    /// against in diff mode.
    pub fn dir_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Scan one repository tree for module descriptors.
///
/// Descriptor parse failures are configuration errors and abort the run;
/// a repository without any descriptor yields an empty list.
pub fn scan_repository(repo: &RepositoryConfig) -> Result<Vec<Module>> {
    let mut modules = Vec::new();
    for file in descriptor_files(&repo.path)? {
        let dir = file.parent().unwrap_or(&repo.path);
        let text = std::fs::read_to_string(&file)?;
        let descriptor: ModuleDescriptor =
            serde_json::from_str(&text).map_err(|e| FleetError::Descriptor {
                path: file.display().to_string(),
                reason: e.to_string(),
            })?;
        let dir_name = dir
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| repo.name.clone());
        let name = descriptor.name.unwrap_or_else(|| dir_name.clone());
        modules.push(Module {
            name,
            repository: repo.name.clone(),
            path: dir.to_path_buf(),
            depends_on: descriptor.depends,
            has_unit_test: descriptor.unit_test,
            browser_capable: descriptor.unit_test
                && repo.unit_in_browser
                && !descriptor.only_headless,
            is_cdn_asset: descriptor.for_cdn,
            is_required: descriptor.required,
            stable_id: descriptor
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        });
    }
    debug!(event = "scan.finished", repository = %repo.name, modules = modules.len());
    Ok(modules)
}

/// Recursive descriptor walker. Entries are visited in name order so that
/// duplicate-name resolution is deterministic.
fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if dir.is_dir() {
        let mut entries = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') || name == "node_modules" {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                files.extend(descriptor_files(&path)?);
            } else if path
                .extension()
                .map(|e| e == DESCRIPTOR_EXT)
                .unwrap_or(false)
            {
                files.push(path);
            }
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_descriptor(root: &Path, dir: &str, body: &str) {
        let module_dir = root.join(dir);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(module_dir.join(format!("{dir}.tfmod")), body).unwrap();
    }

    #[test]
    fn test_scan_discovers_modules_with_flags() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(
            dir.path(),
            "widgets",
            r#"{ "depends": ["core"], "unit_test": true }"#,
        );
        write_descriptor(
            dir.path(),
            "forms",
            r#"{ "depends": ["widgets"], "unit_test": true, "only_headless": true }"#,
        );
        let repo = RepositoryConfig::new("ui-kit", dir.path()).with_browser_tests();

        let mut modules = scan_repository(&repo).unwrap();
        modules.sort_by(|a, b| a.name.cmp(&b.name));

        assert_eq!(modules.len(), 2);
        let forms = &modules[0];
        assert_eq!(forms.name, "forms");
        assert!(forms.has_unit_test);
        assert!(!forms.browser_capable, "only_headless wins over repo flag");
        let widgets = &modules[1];
        assert_eq!(widgets.depends_on, vec!["core".to_string()]);
        assert!(widgets.browser_capable);
    }

    #[test]
    fn test_browser_capability_requires_repo_flag() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "core", r#"{ "unit_test": true }"#);
        let repo = RepositoryConfig::new("platform", dir.path());

        let modules = scan_repository(&repo).unwrap();
        assert!(modules[0].has_unit_test);
        assert!(!modules[0].browser_capable);
    }

    #[test]
    fn test_scan_skips_hidden_and_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "core", r#"{ "unit_test": true }"#);
        write_descriptor(dir.path(), ".git", r#"{ "unit_test": true }"#);
        write_descriptor(dir.path(), "node_modules", r#"{ "unit_test": true }"#);
        let repo = RepositoryConfig::new("platform", dir.path());

        let modules = scan_repository(&repo).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "core");
    }

    #[test]
    fn test_descriptor_name_defaults_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "charts", r#"{}"#);
        let repo = RepositoryConfig::new("ui-kit", dir.path());

        let modules = scan_repository(&repo).unwrap();
        assert_eq!(modules[0].name, "charts");
        assert_eq!(modules[0].dir_name(), "charts");
        assert!(!modules[0].has_unit_test);
    }

    #[test]
    fn test_malformed_descriptor_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_descriptor(dir.path(), "broken", "{ not json");
        let repo = RepositoryConfig::new("ui-kit", dir.path());

        let result = scan_repository(&repo);
        assert!(matches!(result, Err(FleetError::Descriptor { .. })));
    }
}
