//! Macro persistence - pretty JSON array of action nodes
//!
//! `save*` and `load*` never fail towards the caller: problems are logged,
//! saves report `None` and loads degrade to an empty list.

use macrocorder_core::config::APP_DIR;
use macrocorder_core::{flatten, Action, ActionNode, Error, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const EXTENSION: &str = "json";

/// Force the `.json` extension
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(EXTENSION));
    if is_json {
        path.to_path_buf()
    } else {
        path.with_extension(EXTENSION)
    }
}

/// Save a flat action list. Returns the written path.
pub fn save(path: impl AsRef<Path>, actions: &[Action]) -> Option<PathBuf> {
    let nodes: Vec<ActionNode> = actions.iter().cloned().map(ActionNode::from).collect();
    save_tree(path, &nodes)
}

/// Save an editor tree. Returns the written path.
pub fn save_tree(path: impl AsRef<Path>, nodes: &[ActionNode]) -> Option<PathBuf> {
    let path = normalize_path(path);
    match write_nodes(&path, nodes) {
        Ok(()) => {
            info!(path = %path.display(), nodes = nodes.len(), "saved macro");
            Some(path)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to save macro");
            None
        }
    }
}

/// Load a macro flattened into play order
pub fn load(path: impl AsRef<Path>) -> Vec<Action> {
    flatten(&load_tree(path))
}

/// Load the editor tree
pub fn load_tree(path: impl AsRef<Path>) -> Vec<ActionNode> {
    let path = path.as_ref();
    match read_nodes(path) {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not load macro");
            Vec::new()
        }
    }
}

fn write_nodes(path: &Path, nodes: &[ActionNode]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, nodes)?;
    writeln!(w)?;
    w.flush()?;
    Ok(())
}

fn read_nodes(path: &Path) -> Result<Vec<ActionNode>> {
    if !path.exists() {
        return Err(Error::storage(format!("File not found: {}", path.display())));
    }
    let text = fs::read_to_string(path)?;
    match serde_json::from_str::<Vec<ActionNode>>(&text) {
        Ok(nodes) => Ok(nodes),
        // Older files hold a bare array of actions
        Err(tree_err) => match serde_json::from_str::<Vec<Action>>(&text) {
            Ok(actions) => Ok(actions.into_iter().map(ActionNode::from).collect()),
            Err(_) => Err(tree_err.into()),
        },
    }
}

/// Directory of saved macros
pub struct MacroStore {
    dir: PathBuf,
}

impl MacroStore {
    /// `<config dir>/macrocorder/macros`
    pub fn new() -> Result<Self> {
        let base = dirs::config_dir()
            .ok_or_else(|| Error::storage("No config directory on this platform"))?;
        Self::with_dir(base.join(APP_DIR).join("macros"))
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Resolve a user-supplied name: existing paths are used as-is,
    /// bare names live in the store
    pub fn path_for(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() || p.exists() {
            return p.to_path_buf();
        }
        normalize_path(self.dir.join(p))
    }

    /// Timestamped file name for a new recording
    pub fn new_recording_path(&self, name: &str) -> PathBuf {
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!("{}_{}.{}", sanitize(name), ts, EXTENSION))
    }

    pub fn autosave_path(&self) -> PathBuf {
        self.dir.join("autosave.json")
    }

    /// Saved macro file names, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(EXTENSION));
            if is_json {
                if let Some(name) = entry.file_name().to_str() {
                    files.push(name.to_string());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path_for(name))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
