use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::{InstrumentError, Result};

pub const CLASS_SUFFIX: &str = ".class";

/// One compiled class discovered on disk. The names are derived from the
/// file's location relative to the scan root; the class file itself is the
/// authority on its real name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassFileRef {
    pub name: String,
    pub internal_name: String,
    pub path: PathBuf,
}

impl ClassFileRef {
    pub fn new(root: &Path, path: PathBuf) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let internal_name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let internal_name = internal_name
            .strip_suffix(CLASS_SUFFIX)
            .unwrap_or(&internal_name)
            .to_string();

        Self {
            name: internal_name.replace('/', "."),
            internal_name,
            path,
        }
    }
}

/// Breadth-first walk over a build directory yielding every `*.class` file.
///
/// Symbolic links are followed; a directory reached twice (a link cycle or
/// two links to one target) is listed once. Directories that cannot be
/// listed are treated as empty.
#[derive(Debug)]
pub struct ClassScanner {
    root: PathBuf,
    queue: VecDeque<PathBuf>,
    pending: VecDeque<PathBuf>,
    visited: HashSet<PathBuf>,
}

impl ClassScanner {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(InstrumentError::InvalidBuildDirectory(root));
        }
        let root = fs::canonicalize(&root).unwrap_or(root);

        Ok(Self {
            queue: VecDeque::from([root.clone()]),
            pending: VecDeque::new(),
            visited: HashSet::from([root.clone()]),
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn expand(&mut self, dir: &Path) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = fs::metadata(&path) else {
                continue;
            };
            if metadata.is_dir() {
                let target = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
                if self.visited.insert(target) {
                    self.queue.push_back(path);
                }
            } else if metadata.is_file() && is_class_file(&path) {
                self.pending.push_back(path);
            }
        }
    }
}

impl Iterator for ClassScanner {
    type Item = ClassFileRef;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(path) = self.pending.pop_front() {
                return Some(ClassFileRef::new(&self.root, path));
            }
            let dir = self.queue.pop_front()?;
            self.expand(&dir);
        }
    }
}

pub fn is_class_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(CLASS_SUFFIX))
}

/// Collects every jar below `base_path`, used to expand classpath
/// directories such as `lib/`.
pub fn scan_jars(base_path: &Path) -> Vec<PathBuf> {
    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(base_path)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                let path = entry.path();
                if path.extension().is_some_and(|e| e == "jar") {
                    let _ = tx.send(path.to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut jars: Vec<PathBuf> = rx.iter().collect();
    jars.sort();
    jars
}

pub fn class_name_to_class_path(class_name: &str) -> String {
    format!("{}{CLASS_SUFFIX}", class_name.replace('.', "/"))
}
