//! Stored image layout under the storage root
//!
//! Every image lives at `<root>/<owner>/<category>/<entity>/<file>`. Records
//! hold only the relative reference (`owner/category/entity/file`, forward
//! slashes), never an absolute path.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// Owning entity kind of a stored image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetCategory {
    Tier,
    Review,
    User,
}

impl AssetCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetCategory::Tier => "tier",
            AssetCategory::Review => "review",
            AssetCategory::User => "user",
        }
    }
}

impl fmt::Display for AssetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tier" => Ok(AssetCategory::Tier),
            "review" => Ok(AssetCategory::Review),
            "user" => Ok(AssetCategory::User),
            other => Err(format!("unknown asset category '{}'", other)),
        }
    }
}

/// The entity a batch of images belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetTarget {
    pub owner_id: String,
    pub category: AssetCategory,
    pub entity_id: String,
}

impl AssetTarget {
    pub fn new(owner_id: &str, category: AssetCategory, entity_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            category,
            entity_id: entity_id.to_string(),
        }
    }

    /// Relative directory holding this entity's images
    pub fn dir_reference(&self) -> String {
        format!("{}/{}/{}", self.owner_id, self.category, self.entity_id)
    }

    /// Relative reference of a file in this entity's directory
    pub fn file_reference(&self, file_name: &str) -> String {
        format!("{}/{}", self.dir_reference(), file_name)
    }

    /// Seed for the code generator on a given attempt
    pub fn seed(&self, attempt: usize) -> String {
        format!("{}{}_{}", self.owner_id, self.entity_id, attempt)
    }
}

/// Outcome of a batch deletion
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    /// Already absent; not an error
    pub missing: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A file that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupFailure {
    pub reference: String,
    pub error: String,
}

/// Filesystem access to stored images
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute path of a relative reference
    ///
    /// Rejects empty, absolute and `..`-bearing references so a stored value
    /// can never escape the storage root.
    pub fn resolve(&self, reference: &str) -> io::Result<PathBuf> {
        let relative = Path::new(reference);
        let well_formed = !reference.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid asset reference '{}'", reference),
            ));
        }
        Ok(self.root.join(relative))
    }

    pub fn entity_dir(&self, target: &AssetTarget) -> io::Result<PathBuf> {
        self.resolve(&target.dir_reference())
    }

    /// Delete one stored file; `Ok(false)` when it was already gone
    pub fn delete(&self, reference: &str) -> io::Result<bool> {
        match std::fs::remove_file(self.resolve(reference)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete every reference, collecting failures instead of stopping
    pub fn delete_all<'a>(&self, references: impl IntoIterator<Item = &'a str>) -> CleanupReport {
        let mut report = CleanupReport::default();
        for reference in references {
            match self.delete(reference) {
                Ok(true) => report.deleted.push(reference.to_string()),
                Ok(false) => report.missing.push(reference.to_string()),
                Err(e) => {
                    warn!(reference, error = %e, "Failed to delete stored image");
                    report.failures.push(CleanupFailure {
                        reference: reference.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Remove an entity's whole image directory
    pub fn remove_entity_dir(&self, target: &AssetTarget) -> io::Result<()> {
        let dir = self.entity_dir(target)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "Removed asset directory");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
