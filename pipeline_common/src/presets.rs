use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use inference_common::{AnnotateError, Result};

/// Fixed mapping from a preset key to a source video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetRegistry {
    videos: BTreeMap<String, PathBuf>,
}

impl Default for PresetRegistry {
    /// `video1` to `video4` under `static/videos/`.
    fn default() -> Self {
        Self::new((1..=4).map(|i| {
            (
                format!("video{i}"),
                PathBuf::from(format!("static/videos/video{i}.mp4")),
            )
        }))
    }
}

impl PresetRegistry {
    pub fn new<K, P>(entries: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<PathBuf>,
    {
        Self {
            videos: entries
                .into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        }
    }

    /// Reads a json object of `{"key": "path"}` pairs.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| AnnotateError::io(format!("opening presets {path:?}"), e))?;
        let videos: BTreeMap<String, PathBuf> = serde_json::from_reader(file)?;
        log::info!("Loaded {} presets from {path:?}", videos.len());
        Ok(Self { videos })
    }

    /// Source path for `key`, or [`AnnotateError::InvalidSelection`].
    pub fn resolve(&self, key: &str) -> Result<&Path> {
        self.videos
            .get(key)
            .map(PathBuf::as_path)
            .ok_or_else(|| AnnotateError::InvalidSelection {
                key: key.to_string(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.videos.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn default_presets() {
        let presets = PresetRegistry::default();
        assert_eq!(presets.len(), 4);
        assert_eq!(
            presets.resolve("video3").unwrap(),
            Path::new("static/videos/video3.mp4")
        );
    }

    #[test]
    fn unknown_key_is_invalid_selection() {
        let presets = PresetRegistry::default();
        let err = presets.resolve("video5").unwrap_err();
        assert!(matches!(err, AnnotateError::InvalidSelection { key } if key == "video5"));
        assert!(presets.resolve("").is_err());
    }

    #[test]
    fn loads_from_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"clip": "/data/clip.mp4", "other": "b.mkv"}}"#).unwrap();

        let presets = PresetRegistry::from_json_file(file.path()).unwrap();
        assert_eq!(presets.keys().collect::<Vec<_>>(), vec!["clip", "other"]);
        assert_eq!(presets.resolve("clip").unwrap(), Path::new("/data/clip.mp4"));
    }

    #[test]
    fn missing_json_is_io() {
        let err = PresetRegistry::from_json_file(Path::new("/nonexistent/presets.json"))
            .unwrap_err();
        assert!(err.is_io());
    }
}
