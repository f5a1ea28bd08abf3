use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Still-image extensions the decoder accepts.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Video extensions the bundled animated-image engine can play.
pub const VIDEO_EXTENSIONS: &[&str] = &["gif"];

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset {name} is unreadable: {source}")]
    Unreadable {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    fn from_io(name: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            AssetError::NotFound(name.to_string())
        } else {
            AssetError::Unreadable {
                name: name.to_string(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    Video,
}

/// Identifier for one asset; `name` is unique within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId {
    pub kind: AssetKind,
    pub name: String,
}

impl AssetId {
    pub fn image(name: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Image,
            name: name.into(),
        }
    }

    pub fn video(name: impl Into<String>) -> Self {
        Self {
            kind: AssetKind::Video,
            name: name.into(),
        }
    }

    /// Lower-cased extension of the asset name, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

pub trait AssetSource: Send + Sync {
    /// Lists every asset of `kind`, sorted by name.
    fn list(&self, kind: AssetKind) -> Result<Vec<AssetId>, AssetError>;

    fn read(&self, id: &AssetId) -> Result<Vec<u8>, AssetError> {
        let mut reader = self.open(id)?;
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|err| AssetError::from_io(&id.name, err))?;
        Ok(bytes)
    }

    fn open(&self, id: &AssetId) -> Result<Box<dyn Read + Send>, AssetError>;
}

/// Reads assets from one directory per kind. Subdirectories are ignored.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    image_dir: Option<PathBuf>,
    video_dir: Option<PathBuf>,
    video_extensions: Vec<String>,
}

impl DirectoryAssets {
    pub fn new(image_dir: Option<PathBuf>, video_dir: Option<PathBuf>) -> Self {
        Self {
            image_dir,
            video_dir,
            video_extensions: VIDEO_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }

    /// Accepts additional video extensions, for engines that decode more formats.
    pub fn with_video_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for ext in extensions {
            let ext = ext.into().trim_start_matches('.').to_ascii_lowercase();
            if !self.video_extensions.contains(&ext) {
                self.video_extensions.push(ext);
            }
        }
        self
    }

    fn dir_for(&self, kind: AssetKind) -> Option<&Path> {
        match kind {
            AssetKind::Image => self.image_dir.as_deref(),
            AssetKind::Video => self.video_dir.as_deref(),
        }
    }

    fn accepts(&self, kind: AssetKind, ext: &str) -> bool {
        match kind {
            AssetKind::Image => IMAGE_EXTENSIONS.contains(&ext),
            AssetKind::Video => self.video_extensions.iter().any(|known| known == ext),
        }
    }

    fn path_of(&self, id: &AssetId) -> Result<PathBuf, AssetError> {
        let dir = self
            .dir_for(id.kind)
            .ok_or_else(|| AssetError::NotFound(id.name.clone()))?;
        // Names come from `list`; anything with a separator is not ours.
        if id.name.contains(['/', '\\']) || id.name == ".." {
            return Err(AssetError::NotFound(id.name.clone()));
        }
        Ok(dir.join(&id.name))
    }
}

impl AssetSource for DirectoryAssets {
    fn list(&self, kind: AssetKind) -> Result<Vec<AssetId>, AssetError> {
        let Some(dir) = self.dir_for(kind) else {
            return Ok(Vec::new());
        };
        let label = dir.display().to_string();
        let entries = fs::read_dir(dir).map_err(|err| AssetError::from_io(&label, err))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| AssetError::from_io(&label, err))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                tracing::debug!(path = %path.display(), "skipping asset with non UTF-8 name");
                continue;
            };
            let id = AssetId {
                kind,
                name: name.to_string(),
            };
            match id.extension() {
                Some(ext) if self.accepts(kind, &ext) => ids.push(id),
                _ => tracing::debug!(name, ?kind, "skipping file with unsupported extension"),
            }
        }
        ids.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ids)
    }

    fn open(&self, id: &AssetId) -> Result<Box<dyn Read + Send>, AssetError> {
        let path = self.path_of(id)?;
        let file = File::open(&path).map_err(|err| AssetError::from_io(&id.name, err))?;
        Ok(Box::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_images_by_extension() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.jpeg", "notes.txt", "clip.gif"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let source = DirectoryAssets::new(Some(dir.path().to_path_buf()), None);
        let names: Vec<String> = source
            .list(AssetKind::Image)
            .unwrap()
            .into_iter()
            .map(|id| id.name)
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg"]);
        assert!(source.list(AssetKind::Video).unwrap().is_empty());
    }

    #[test]
    fn extra_video_extensions_are_accepted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("one.gif"), b"x").unwrap();
        fs::write(dir.path().join("two.mp4"), b"x").unwrap();

        let plain = DirectoryAssets::new(None, Some(dir.path().to_path_buf()));
        assert_eq!(plain.list(AssetKind::Video).unwrap().len(), 1);

        let extended = plain.with_video_extensions([".MP4"]);
        assert_eq!(extended.list(AssetKind::Video).unwrap().len(), 2);
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = tempdir().unwrap();
        let source = DirectoryAssets::new(Some(dir.path().join("absent")), None);
        let err = source.list(AssetKind::Image).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[test]
    fn reads_bytes_and_reports_missing_items() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("logo.png"), b"pixels").unwrap();
        let source = DirectoryAssets::new(Some(dir.path().to_path_buf()), None);

        assert_eq!(source.read(&AssetId::image("logo.png")).unwrap(), b"pixels");
        let err = source.read(&AssetId::image("gone.png")).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(name) if name == "gone.png"));
        let err = source.read(&AssetId::image("../logo.png")).unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
