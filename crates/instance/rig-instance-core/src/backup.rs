//! Copies of an instance's DNA files taken around commits and exports.
//!
//! A backup is a folder `<root>/<instance>/<id>` holding `head_<file>` and
//! `body_<file>` copies next to a `metadata.json` record. Ids are local
//! timestamps, so ordering ids orders backups by age.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::config::BackupConfig;
use crate::error::InstanceError;

pub const METADATA_FILE: &str = "metadata.json";
const ID_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// What triggered a backup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackupType {
    #[serde(rename = "Pose Editor Commit")]
    PoseEditor,
    #[serde(rename = "Expression Editor Commit")]
    ExpressionEditor,
    #[serde(rename = "Pre RBF Editor Commit")]
    PreRbfEditorCommit,
    #[serde(rename = "Post RBF Editor Commit")]
    PostRbfEditorCommit,
    #[serde(rename = "Calibration")]
    Calibration,
    #[serde(rename = "Export")]
    Export,
    #[serde(rename = "File Saved")]
    FileSave,
}

impl BackupType {
    pub fn label(self) -> &'static str {
        match self {
            Self::PoseEditor => "Pose Editor Commit",
            Self::ExpressionEditor => "Expression Editor Commit",
            Self::PreRbfEditorCommit => "Pre RBF Editor Commit",
            Self::PostRbfEditorCommit => "Post RBF Editor Commit",
            Self::Calibration => "Calibration",
            Self::Export => "Export",
            Self::FileSave => "File Saved",
        }
    }
}

/// Contents of `metadata.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// RFC 3339 local time.
    pub timestamp: String,
    pub backup_type: BackupType,
    pub description: String,
    pub instance_name: String,
    /// Backup copies that were written.
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub head_dna_path: Option<PathBuf>,
    #[serde(default)]
    pub body_dna_path: Option<PathBuf>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BackupEntry {
    pub id: String,
    pub folder: PathBuf,
    pub metadata: BackupMetadata,
}

/// The DNA files a backup copies. Missing paths are skipped.
#[derive(Clone, Copy, Debug, Default)]
pub struct BackupSources<'a> {
    pub head: Option<&'a Path>,
    pub body: Option<&'a Path>,
}

fn backup_error(action: &str, path: &Path, err: io::Error) -> InstanceError {
    InstanceError::Backup {
        reason: format!("{action} '{}': {err}", path.display()),
    }
}

fn copy_name(prefix: &str, source: &Path) -> Option<String> {
    let name = source.file_name()?.to_string_lossy();
    Some(format!("{prefix}_{name}"))
}

#[derive(Clone, Debug)]
pub struct BackupManager {
    root: PathBuf,
    max_backups: usize,
}

impl BackupManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_backups: BackupConfig::default().max_backups,
        }
    }

    pub fn from_config(config: &BackupConfig) -> Self {
        let root = config
            .root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("rig_dna_backups"));
        Self::new(root).with_max_backups(config.max_backups)
    }

    /// At least one backup is always kept.
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    pub fn instance_folder(&self, instance: &str) -> PathBuf {
        self.root.join(instance)
    }

    /// Reserve a fresh backup folder. Ids taken within the same millisecond
    /// get a numbered suffix that still sorts after the plain id.
    fn reserve_folder(&self, instance: &str) -> Result<(String, PathBuf), InstanceError> {
        let parent = self.instance_folder(instance);
        fs::create_dir_all(&parent).map_err(|err| backup_error("create", &parent, err))?;
        let stamp = Local::now().format(ID_FORMAT).to_string();
        let mut suffix = 0u32;
        loop {
            let id = match suffix {
                0 => stamp.clone(),
                n => format!("{stamp}_{n:03}"),
            };
            let folder = parent.join(&id);
            match fs::create_dir(&folder) {
                Ok(()) => return Ok((id, folder)),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => return Err(backup_error("create", &folder, err)),
            }
        }
    }

    /// Copy the source files into a new backup and prune old ones.
    ///
    /// Returns `None` when none of the sources exists on disk.
    pub fn create(
        &self,
        instance: &str,
        sources: BackupSources<'_>,
        backup_type: BackupType,
        description: Option<&str>,
    ) -> Result<Option<BackupEntry>, InstanceError> {
        let (id, folder) = self.reserve_folder(instance)?;
        match self.fill(instance, &folder, sources, backup_type, description) {
            Ok(Some(metadata)) => {
                log::info!("created DNA backup '{id}' of '{instance}'");
                self.prune(instance)?;
                Ok(Some(BackupEntry {
                    id,
                    folder,
                    metadata,
                }))
            }
            Ok(None) => {
                let _ = fs::remove_dir_all(&folder);
                log::warn!("no DNA files of '{instance}' found to back up");
                Ok(None)
            }
            Err(err) => {
                let _ = fs::remove_dir_all(&folder);
                Err(err)
            }
        }
    }

    fn fill(
        &self,
        instance: &str,
        folder: &Path,
        sources: BackupSources<'_>,
        backup_type: BackupType,
        description: Option<&str>,
    ) -> Result<Option<BackupMetadata>, InstanceError> {
        let mut files = Vec::new();
        for (prefix, source) in [("head", sources.head), ("body", sources.body)] {
            let Some(source) = source.filter(|path| path.is_file()) else {
                continue;
            };
            let Some(name) = copy_name(prefix, source) else {
                continue;
            };
            let dest = folder.join(name);
            fs::copy(source, &dest).map_err(|err| backup_error("copy", source, err))?;
            log::debug!("backed up {} -> {}", source.display(), dest.display());
            files.push(dest);
        }
        if files.is_empty() {
            return Ok(None);
        }

        let metadata = BackupMetadata {
            timestamp: Local::now().to_rfc3339(),
            backup_type,
            description: description.unwrap_or(backup_type.label()).to_string(),
            instance_name: instance.to_string(),
            files,
            head_dna_path: sources.head.map(Path::to_path_buf),
            body_dna_path: sources.body.map(Path::to_path_buf),
        };
        let path = folder.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(&metadata).map_err(|err| InstanceError::Backup {
            reason: err.to_string(),
        })?;
        fs::write(&path, json).map_err(|err| backup_error("write", &path, err))?;
        Ok(Some(metadata))
    }

    /// Backup ids of `instance`, newest first. Folders without metadata are
    /// included so pruning sees them.
    fn ids(&self, instance: &str) -> Result<Vec<String>, InstanceError> {
        let parent = self.instance_folder(instance);
        let entries = match fs::read_dir(&parent) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(backup_error("read", &parent, err)),
        };
        let mut ids: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids)
    }

    pub fn load(&self, instance: &str, id: &str) -> Result<BackupEntry, InstanceError> {
        let folder = self.instance_folder(instance).join(id);
        let path = folder.join(METADATA_FILE);
        let json = fs::read_to_string(&path).map_err(|err| backup_error("read", &path, err))?;
        let metadata = serde_json::from_str(&json).map_err(|err| InstanceError::Backup {
            reason: format!("metadata of backup '{id}': {err}"),
        })?;
        Ok(BackupEntry {
            id: id.to_string(),
            folder,
            metadata,
        })
    }

    /// Backups of `instance` with readable metadata, newest first.
    pub fn list(&self, instance: &str) -> Result<Vec<BackupEntry>, InstanceError> {
        let mut entries = Vec::new();
        for id in self.ids(instance)? {
            match self.load(instance, &id) {
                Ok(entry) => entries.push(entry),
                Err(err) => log::warn!("skipping backup '{id}' of '{instance}': {err}"),
            }
        }
        Ok(entries)
    }

    /// Copy a backup's files back over the paths it was taken from.
    /// Returns the restored paths.
    pub fn restore(&self, instance: &str, id: &str) -> Result<Vec<PathBuf>, InstanceError> {
        let entry = self.load(instance, id)?;
        let mut restored = Vec::new();
        for (prefix, target) in [
            ("head", entry.metadata.head_dna_path.as_deref()),
            ("body", entry.metadata.body_dna_path.as_deref()),
        ] {
            let Some(target) = target else { continue };
            let Some(name) = copy_name(prefix, target) else {
                continue;
            };
            let copy = entry.folder.join(name);
            if !copy.is_file() {
                continue;
            }
            fs::copy(&copy, target).map_err(|err| backup_error("restore", target, err))?;
            log::info!("restored {} -> {}", copy.display(), target.display());
            restored.push(target.to_path_buf());
        }
        Ok(restored)
    }

    /// Returns false when the backup does not exist.
    pub fn delete(&self, instance: &str, id: &str) -> Result<bool, InstanceError> {
        let folder = self.instance_folder(instance).join(id);
        if !folder.is_dir() {
            log::warn!("backup '{id}' of '{instance}' not found");
            return Ok(false);
        }
        fs::remove_dir_all(&folder).map_err(|err| backup_error("delete", &folder, err))?;
        log::debug!("deleted backup '{id}' of '{instance}'");
        Ok(true)
    }

    /// Delete all but the newest `max_backups` backups. Returns the deleted ids.
    pub fn prune(&self, instance: &str) -> Result<Vec<String>, InstanceError> {
        let ids = self.ids(instance)?;
        let mut deleted = Vec::new();
        for id in ids.into_iter().skip(self.max_backups) {
            if self.delete(instance, &id)? {
                deleted.push(id);
            }
        }
        if !deleted.is_empty() {
            log::info!("pruned {} old backup(s) of '{instance}'", deleted.len());
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dna_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn backup_copies_files_and_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let head = dna_file(dir.path(), "ada_head.json", "head");
        let manager = BackupManager::new(dir.path().join("backups"));

        let entry = manager
            .create(
                "ada",
                BackupSources {
                    head: Some(&head),
                    body: Some(&dir.path().join("missing.json")),
                },
                BackupType::PreRbfEditorCommit,
                None,
            )
            .unwrap()
            .unwrap();
        let copy = entry.folder.join("head_ada_head.json");
        assert_eq!(fs::read_to_string(&copy).unwrap(), "head");
        assert_eq!(entry.metadata.files, vec![copy]);
        assert_eq!(entry.metadata.description, "Pre RBF Editor Commit");

        let json = fs::read_to_string(entry.folder.join(METADATA_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["backup_type"], "Pre RBF Editor Commit");
        assert_eq!(value["instance_name"], "ada");
        assert_eq!(manager.list("ada").unwrap(), vec![entry]);
    }

    #[test]
    fn nothing_to_copy_leaves_no_folder() {
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(dir.path());
        let created = manager
            .create("ada", BackupSources::default(), BackupType::Export, None)
            .unwrap();
        assert!(created.is_none());
        assert!(manager.list("ada").unwrap().is_empty());
    }

    #[test]
    fn rotation_keeps_the_newest_backups() {
        let dir = tempfile::tempdir().unwrap();
        let body = dna_file(dir.path(), "body.json", "v0");
        let manager = BackupManager::new(dir.path().join("backups")).with_max_backups(3);
        let sources = BackupSources {
            head: None,
            body: Some(&body),
        };

        let mut ids = Vec::new();
        for version in 0..5 {
            fs::write(&body, format!("v{version}")).unwrap();
            let entry = manager
                .create("ada", sources, BackupType::Calibration, None)
                .unwrap()
                .unwrap();
            ids.push(entry.id);
        }

        let kept: Vec<String> = manager.list("ada").unwrap().into_iter().map(|e| e.id).collect();
        ids.reverse();
        assert_eq!(kept, ids[..3].to_vec());
        let newest = manager.load("ada", &kept[0]).unwrap();
        assert_eq!(
            fs::read_to_string(newest.folder.join("body_body.json")).unwrap(),
            "v4"
        );
    }

    #[test]
    fn restore_copies_back_and_delete_removes() {
        let dir = tempfile::tempdir().unwrap();
        let head = dna_file(dir.path(), "head.dna", "original");
        let manager = BackupManager::new(dir.path().join("backups"));
        let sources = BackupSources {
            head: Some(&head),
            body: None,
        };
        let entry = manager
            .create("ada", sources, BackupType::PoseEditor, Some("before edits"))
            .unwrap()
            .unwrap();
        assert_eq!(entry.metadata.description, "before edits");

        fs::write(&head, "edited").unwrap();
        assert_eq!(manager.restore("ada", &entry.id).unwrap(), vec![head.clone()]);
        assert_eq!(fs::read_to_string(&head).unwrap(), "original");

        assert!(manager.delete("ada", &entry.id).unwrap());
        assert!(!manager.delete("ada", &entry.id).unwrap());
        assert_eq!(
            manager.restore("ada", &entry.id).unwrap_err().category(),
            "backup"
        );
    }

    #[test]
    fn max_backups_never_drops_below_one() {
        let manager = BackupManager::new("/tmp").with_max_backups(0);
        assert_eq!(manager.max_backups(), 1);
    }
}
