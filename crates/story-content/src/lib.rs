#![deny(warnings)]

//! Loads an authored story catalog from a content directory:
//!
//! ```text
//! <root>/engine.yaml        optional EngineConfig
//! <root>/events/*.yaml      sequences of events
//! <root>/arcs/*.yaml        sequences of arc definitions
//! ```
//!
//! Files are read in sorted name order so catalog order is stable.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use story_core::{ArcDefinition, Catalog, EngineConfig, StoryEvent, ValidationError};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("io error at {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("invalid yaml in {path}: {message}")]
    Yaml { path: PathBuf, message: String },
    #[error("invalid content: {0}")]
    Invalid(#[from] ValidationError),
}

/// A validated catalog plus the engine configuration shipped with it.
#[derive(Debug, Clone)]
pub struct Content {
    pub catalog: Catalog,
    pub config: EngineConfig,
}

/// Load and validate everything under `root`.
pub fn load_dir<P: AsRef<Path>>(root: P) -> Result<Content, ContentError> {
    let root = root.as_ref();
    let mut events: Vec<StoryEvent> = Vec::new();
    for path in yaml_files(&root.join("events"))? {
        let batch: Vec<StoryEvent> = read_yaml(&path)?;
        debug!(file = %path.display(), count = batch.len(), "events loaded");
        events.extend(batch);
    }
    let mut arcs: Vec<ArcDefinition> = Vec::new();
    for path in yaml_files(&root.join("arcs"))? {
        let batch: Vec<ArcDefinition> = read_yaml(&path)?;
        debug!(file = %path.display(), count = batch.len(), "arcs loaded");
        arcs.extend(batch);
    }
    let config = load_config(root.join("engine.yaml"))?;
    let catalog = Catalog::new(events, arcs)?;
    for (source, target) in catalog.dangling_references() {
        warn!(%source, %target, "follow-up points at an event missing from the catalog");
    }
    info!(
        root = %root.display(),
        events = catalog.len(),
        arcs = catalog.arcs().count(),
        "content loaded"
    );
    Ok(Content { catalog, config })
}

/// Engine configuration from `path`, or defaults when the file is absent.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ContentError> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "no engine config; using defaults");
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = read_yaml(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse a YAML sequence of events, e.g. for content authored inline.
pub fn parse_events(text: &str) -> Result<Vec<StoryEvent>, ContentError> {
    serde_yaml::from_str(text).map_err(|e| ContentError::Yaml {
        path: PathBuf::from("<inline>"),
        message: e.to_string(),
    })
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, ContentError> {
    let text = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_yaml::from_str(&text).map_err(|e| ContentError::Yaml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, ContentError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "content directory absent");
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        let is_yaml = path
            .extension()
            .and_then(|x| x.to_str())
            .map(|x| x == "yaml" || x == "yml")
            .unwrap_or(false);
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn io_error(path: &Path, e: std::io::Error) -> ContentError {
    ContentError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}
