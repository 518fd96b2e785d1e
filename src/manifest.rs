//! Slideshow manifest files (JSON or TOML).
//!
//! ```toml
//! transition = "assets/transition.mp4"
//! background = "assets/music.mp3"
//!
//! [[units]]
//! group = 1
//! image = "slides/a.jpg"
//! texts = ["First line", "Second line"]
//! ```
//!
//! The older request shape, `{"memes": [{"template_id", "boxes", "image"}]}`,
//! is accepted too. Each meme becomes its own group. Relative paths resolve
//! against the manifest's directory.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::slideshow::{CaptionUnit, SlideshowInput};

/// Manifest encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// `.toml` is TOML, anything else is read as JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    transition: PathBuf,
    background: PathBuf,
    #[serde(default)]
    units: Vec<UnitEntry>,
    #[serde(default)]
    memes: Vec<MemeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UnitEntry {
    group: GroupId,
    image: PathBuf,
    #[serde(default)]
    texts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MemeEntry {
    template_id: GroupId,
    boxes: Vec<String>,
    image: PathBuf,
}

/// Groups may be written as strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupId {
    Number(i64),
    Name(String),
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(s) => f.write_str(s),
        }
    }
}

/// Load a manifest from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse.
pub fn load(path: &Path) -> Result<SlideshowInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    parse(&content, ManifestFormat::from_path(path), base)
        .with_context(|| format!("invalid manifest {}", path.display()))
}

/// Parse manifest text, resolving relative paths against `base`.
///
/// # Errors
///
/// Returns an error on malformed input, or if both `units` and `memes` are
/// given.
pub fn parse(content: &str, format: ManifestFormat, base: &Path) -> Result<SlideshowInput> {
    let file: ManifestFile = match format {
        ManifestFormat::Json => serde_json::from_str(content)?,
        ManifestFormat::Toml => toml::from_str(content)?,
    };

    if !file.units.is_empty() && !file.memes.is_empty() {
        bail!("manifest has both `units` and `memes`; use one");
    }

    let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };

    let units = if file.memes.is_empty() {
        file.units
            .into_iter()
            .map(|u| CaptionUnit::new(u.group.to_string(), resolve(&u.image), u.texts))
            .collect()
    } else {
        // One group per meme, labelled like the captioned dataset was
        file.memes
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                CaptionUnit::new(
                    format!("{}_{}", i + 1, m.template_id),
                    resolve(&m.image),
                    m.boxes,
                )
            })
            .collect()
    };

    Ok(SlideshowInput {
        units,
        transition: resolve(&file.transition),
        background: resolve(&file.background),
    })
}
