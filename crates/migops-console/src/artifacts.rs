use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::ConsoleError;
use crate::meta_cache::needs_meta;

/// Prefix → file names, in the order the listing produced them.
pub type PrefixMap = IndexMap<String, Vec<String>>;

pub const ROOT_CATEGORY: &str = "ROOT";

/// Bucket and root folder that every artifact key lives under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageLayout {
    pub bucket: String,
    root: String,
}

impl StorageLayout {
    pub fn new(bucket: &str, root: &str) -> Self {
        Self {
            bucket: bucket.trim().to_string(),
            root: root.trim().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `<root>/`, the display form of the root prefix.
    pub fn root_display(&self) -> String {
        format!("{}/", self.root)
    }

    fn is_root_prefix(&self, prefix: &str) -> bool {
        prefix.is_empty() || prefix == "/" || prefix == self.root_display()
    }

    pub fn s3_uri(&self, key_prefix: &str, name: &str) -> String {
        format!("s3://{}/{}/{key_prefix}{name}", self.bucket, self.root)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactGroup {
    pub display_prefix: String,
    pub category: String,
    pub key_prefix: String,
    pub files: Vec<String>,
    pub files_count: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRow {
    pub name: String,
    pub s3_uri: String,
    pub rel_key: String,
    pub needs_meta: bool,
}

impl FileRow {
    pub fn new(layout: &StorageLayout, key_prefix: &str, name: &str) -> Self {
        Self {
            name: name.to_string(),
            s3_uri: layout.s3_uri(key_prefix, name),
            rel_key: format!("{key_prefix}{name}"),
            needs_meta: needs_meta(name),
        }
    }
}

impl ArtifactGroup {
    fn from_prefix(layout: &StorageLayout, prefix: &str, files: &[String]) -> Self {
        let (display_prefix, category, key_prefix) = if layout.is_root_prefix(prefix) {
            (layout.root_display(), ROOT_CATEGORY.to_string(), String::new())
        } else {
            let category = prefix.split('/').next().unwrap_or_default().to_string();
            (prefix.to_string(), category, prefix.to_string())
        };
        Self {
            display_prefix,
            category,
            key_prefix,
            files: files.to_vec(),
            files_count: files.len(),
        }
    }

    pub fn file_rows(&self, layout: &StorageLayout) -> Vec<FileRow> {
        self.files
            .iter()
            .map(|name| FileRow::new(layout, &self.key_prefix, name))
            .collect()
    }
}

/// Derives the group table once, ordered by display prefix.
pub fn build_groups(layout: &StorageLayout, prefix_map: &PrefixMap) -> Vec<ArtifactGroup> {
    let mut groups: Vec<ArtifactGroup> = prefix_map
        .iter()
        .map(|(prefix, files)| ArtifactGroup::from_prefix(layout, prefix, files))
        .collect();
    groups.sort_by(|a, b| a.display_prefix.cmp(&b.display_prefix));
    groups
}

pub fn load_prefix_map(path: &Path) -> Result<PrefixMap, ConsoleError> {
    let raw = fs::read_to_string(path).map_err(|source| ConsoleError::PrefixMapIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConsoleError::PrefixMapParse {
        path: path.to_path_buf(),
        source,
    })
}

/// The artifact table plus the layout used to address its files.
#[derive(Clone, Debug)]
pub struct ArtifactBrowser {
    layout: StorageLayout,
    groups: Vec<ArtifactGroup>,
}

impl ArtifactBrowser {
    pub fn new(layout: StorageLayout, prefix_map: &PrefixMap) -> Self {
        let groups = build_groups(&layout, prefix_map);
        Self { layout, groups }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn groups(&self) -> &[ArtifactGroup] {
        &self.groups
    }

    pub fn group(&self, display_prefix: &str) -> Result<&ArtifactGroup, ConsoleError> {
        let wanted = display_prefix.trim();
        self.groups
            .iter()
            .find(|group| group.display_prefix == wanted)
            .ok_or_else(|| ConsoleError::UnknownGroup(wanted.to_string()))
    }

    pub fn file_rows(&self, display_prefix: &str) -> Result<Vec<FileRow>, ConsoleError> {
        Ok(self.group(display_prefix)?.file_rows(&self.layout))
    }
}
