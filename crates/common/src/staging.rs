//! On-disk staging of unpacked campaigns, one directory per campaign id.

use std::fs;
use std::path::{Component, Path, PathBuf};

use error_stack::{Report, ResultExt};

use crate::constants::DESCRIPTOR_FILE_NAME;
use crate::error::AdReelError;
use crate::package::CampaignPackage;
use crate::parser::is_contained;

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `campaign_id`.
    ///
    /// # Errors
    ///
    /// Returns a staging error if the id would escape the staging root.
    pub fn campaign_dir(&self, campaign_id: &str) -> Result<PathBuf, Report<AdReelError>> {
        let id = Path::new(campaign_id);
        let mut components = id.components();
        let single_name = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single_name {
            return Err(Report::new(AdReelError::Staging {
                message: format!("Campaign id '{campaign_id}' is not a valid directory name"),
            }));
        }
        Ok(self.root.join(id))
    }

    /// Replaces the campaign directory with the package's media files and
    /// descriptor. Returns the directory.
    ///
    /// # Errors
    ///
    /// Returns a staging error on any filesystem failure or when a media
    /// file name escapes the directory, and a parse error for undecodable
    /// media.
    pub fn stage(
        &self,
        campaign_id: &str,
        package: &CampaignPackage,
    ) -> Result<PathBuf, Report<AdReelError>> {
        let dir = self.campaign_dir(campaign_id)?;

        if dir.exists() {
            fs::remove_dir_all(&dir).change_context(AdReelError::Staging {
                message: format!("Failed to clear {}", dir.display()),
            })?;
        }
        fs::create_dir_all(&dir).change_context(AdReelError::Staging {
            message: format!("Failed to create {}", dir.display()),
        })?;

        for file in &package.files {
            let relative = Path::new(&file.name);
            if !is_contained(relative) {
                return Err(Report::new(AdReelError::Staging {
                    message: format!("Package entry '{}' escapes the campaign directory", file.name),
                }));
            }
            let bytes = file.decode()?;
            let target = dir.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).change_context(AdReelError::Staging {
                    message: format!("Failed to create {}", parent.display()),
                })?;
            }
            fs::write(&target, bytes).change_context(AdReelError::Staging {
                message: format!("Failed to write {}", target.display()),
            })?;
        }

        let descriptor = serde_json::to_vec_pretty(&package.document).change_context(
            AdReelError::Staging {
                message: "Failed to serialize campaign descriptor".to_string(),
            },
        )?;
        let descriptor_path = dir.join(DESCRIPTOR_FILE_NAME);
        fs::write(&descriptor_path, descriptor).change_context(AdReelError::Staging {
            message: format!("Failed to write {}", descriptor_path.display()),
        })?;

        log::debug!(
            "Staged campaign {} with {} media files in {}",
            campaign_id,
            package.files.len(),
            dir.display()
        );
        Ok(dir)
    }

    /// Reads the descriptor of a staged campaign.
    ///
    /// # Errors
    ///
    /// Returns a staging error if the descriptor cannot be read.
    pub fn read_descriptor(&self, dir: &Path) -> Result<Vec<u8>, Report<AdReelError>> {
        let path = dir.join(DESCRIPTOR_FILE_NAME);
        fs::read(&path).change_context(AdReelError::Staging {
            message: format!("Failed to read {}", path.display()),
        })
    }

    /// Deletes the whole staging root.
    ///
    /// # Errors
    ///
    /// Returns a staging error if the root exists but cannot be removed.
    pub fn purge(&self) -> Result<(), Report<AdReelError>> {
        if !self.root.exists() {
            return Ok(());
        }
        fs::remove_dir_all(&self.root).change_context(AdReelError::Staging {
            message: format!("Failed to remove {}", self.root.display()),
        })?;
        log::info!("Purged campaign staging at {}", self.root.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::PackageFile;
    use crate::parser::{CampaignDocument, SlotEntry};
    use tempfile::TempDir;

    fn package_with(files: Vec<PackageFile>) -> CampaignPackage {
        CampaignPackage {
            document: CampaignDocument {
                slots: vec![SlotEntry {
                    media: Some("a.png".to_string()),
                    ..SlotEntry::default()
                }],
                ..CampaignDocument::default()
            },
            files,
        }
    }

    #[test]
    fn test_stage_writes_media_and_descriptor() {
        let temp = TempDir::new().expect("should create temp dir");
        let staging = StagingArea::new(temp.path().join("stage"));
        let package = package_with(vec![
            PackageFile::from_bytes("a.png", b"first"),
            PackageFile::from_bytes("img/b.png", b"second"),
        ]);

        let dir = staging.stage("spring", &package).expect("should stage");
        assert_eq!(dir, temp.path().join("stage").join("spring"));
        assert_eq!(fs::read(dir.join("a.png")).expect("a.png"), b"first");
        assert_eq!(fs::read(dir.join("img/b.png")).expect("b.png"), b"second");

        let descriptor = staging.read_descriptor(&dir).expect("descriptor");
        let document: CampaignDocument =
            serde_json::from_slice(&descriptor).expect("descriptor should be JSON");
        assert_eq!(document.slots.len(), 1);
    }

    #[test]
    fn test_restage_replaces_previous_contents() {
        let temp = TempDir::new().expect("should create temp dir");
        let staging = StagingArea::new(temp.path());
        let dir = staging
            .stage("spring", &package_with(vec![PackageFile::from_bytes("old.png", b"x")]))
            .expect("first stage");
        staging
            .stage("spring", &package_with(vec![PackageFile::from_bytes("new.png", b"y")]))
            .expect("second stage");

        assert!(!dir.join("old.png").exists());
        assert!(dir.join("new.png").exists());
    }

    #[test]
    fn test_escaping_entry_is_rejected() {
        let temp = TempDir::new().expect("should create temp dir");
        let staging = StagingArea::new(temp.path().join("stage"));
        let err = staging
            .stage(
                "spring",
                &package_with(vec![PackageFile::from_bytes("../evil.png", b"x")]),
            )
            .expect_err("escaping entry should fail");
        assert!(matches!(err.current_context(), AdReelError::Staging { .. }));
        assert!(!temp.path().join("evil.png").exists());
    }

    #[test]
    fn test_invalid_campaign_id_is_rejected() {
        let staging = StagingArea::new("/tmp/adreel-test");
        assert!(staging.campaign_dir("../spring").is_err());
        assert!(staging.campaign_dir("a/b").is_err());
        assert!(staging.campaign_dir(".").is_err());
        assert!(staging.campaign_dir("spring").is_ok());
    }

    #[test]
    fn test_purge_removes_root() {
        let temp = TempDir::new().expect("should create temp dir");
        let root = temp.path().join("stage");
        let staging = StagingArea::new(&root);
        staging
            .stage("spring", &package_with(Vec::new()))
            .expect("should stage");
        assert!(root.exists());

        staging.purge().expect("should purge");
        assert!(!root.exists());
        staging.purge().expect("purging twice is fine");
    }
}
