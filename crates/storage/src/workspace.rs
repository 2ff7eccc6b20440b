//! Read-only access to the artifact tree an agent produced.
//!
//! Paths in checklists are written relative to the work directory
//! (`workspace/chapters/*.md`). Agents sometimes write through a tool that
//! already prefixes `workspace/`, which leaves files under
//! `workspace/workspace/`; every lookup here falls back to that nesting.

use globset::{GlobBuilder, GlobMatcher};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{Result, StorageError};

const WORKSPACE_PREFIX: &str = "workspace/";
const NESTED_PREFIX: &str = "workspace/workspace/";

/// A JSON file as found on disk.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonDocument {
    /// Parsed successfully
    Parsed(Value),
    /// Present but not valid JSON
    Malformed {
        /// Raw text
        raw: String,
        /// 1-based line of the syntax error
        line: usize,
        /// 1-based column of the syntax error
        column: usize,
        /// Parser message
        message: String,
    },
}

impl JsonDocument {
    /// Parse text, keeping the raw content on failure.
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::Parsed(value),
            Err(e) => Self::Malformed {
                line: e.line(),
                column: e.column(),
                message: e.to_string(),
                raw,
            },
        }
    }

    /// The parsed value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Parsed(value) => Some(value),
            Self::Malformed { .. } => None,
        }
    }
}

/// A top-level directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// File or directory name
    pub name: String,
    /// Whether it is a directory
    pub is_dir: bool,
}

/// Tolerant, read-only view of a work directory.
#[derive(Debug, Clone)]
pub struct WorkspaceAccessor {
    work_dir: PathBuf,
}

impl WorkspaceAccessor {
    /// Create an accessor rooted at the work directory (parent of `workspace/`).
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    /// The work directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Absolute path for a relative one, without any fallback.
    pub fn path(&self, relative: &str) -> PathBuf {
        self.work_dir.join(relative.trim_start_matches("./"))
    }

    /// Resolve an existing path, retrying under `workspace/workspace/`.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let direct = self.path(relative);
        if direct.exists() {
            return Some(direct);
        }
        nested_variant(relative)
            .map(|nested| self.path(&nested))
            .filter(|nested| nested.exists())
    }

    /// Like [`resolve`](Self::resolve) but returns the direct path when nothing exists.
    pub fn resolve_or_direct(&self, relative: &str) -> PathBuf {
        self.resolve(relative).unwrap_or_else(|| self.path(relative))
    }

    /// Match a glob, retrying under `workspace/workspace/` when nothing matches.
    ///
    /// Results are ordered by the number embedded in the file name.
    pub fn glob(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let mut matched = self.glob_once(pattern)?;
        if matched.is_empty() {
            if let Some(nested) = nested_variant(pattern) {
                matched = self.glob_once(&nested)?;
            }
        }
        sort_by_chapter_number(&mut matched);
        Ok(matched)
    }

    /// Glob with the extra leniency used for free-form analysis targets:
    /// a trailing `/` means every entry of the directory, a missing
    /// `workspace/` prefix is added, and `_script.json` names also match
    /// their plain `.json` counterparts.
    pub fn glob_flexible(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = if pattern.ends_with('/') {
            format!("{pattern}*")
        } else {
            pattern.to_string()
        };

        let mut matched = self.glob(&pattern)?;
        if matched.is_empty() && !pattern.starts_with(WORKSPACE_PREFIX) {
            matched = self.glob(&format!("{WORKSPACE_PREFIX}{pattern}"))?;
        }
        if matched.is_empty() && pattern.contains("_script.json") {
            matched = self.glob(&pattern.replace("_script.json", ".json"))?;
        }
        Ok(matched)
    }

    /// Match a glob and keep regular files only.
    pub fn glob_files(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .glob(pattern)?
            .into_iter()
            .filter(|p| p.is_file())
            .collect())
    }

    /// Read a file as UTF-8 text.
    pub fn read_text(&self, path: &Path) -> Result<String> {
        std::fs::read_to_string(path).map_err(|source| StorageError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read a file and try to parse it as JSON.
    pub fn read_json(&self, path: &Path) -> Result<JsonDocument> {
        Ok(JsonDocument::parse(self.read_text(path)?))
    }

    /// List the top-level entries of a directory, sorted by name.
    pub fn list_dir(&self, dir: &Path) -> Result<Vec<EntryInfo>> {
        let io_err = |source| StorageError::Io {
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            entries.push(EntryInfo {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.path().is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn glob_once(&self, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern = pattern.trim_start_matches("./");
        let components: Vec<&str> = pattern.split('/').filter(|c| !c.is_empty()).collect();

        let Some(first_glob) = components.iter().position(|c| has_glob_meta(c)) else {
            let path = self.path(pattern);
            return Ok(if path.exists() { vec![path] } else { Vec::new() });
        };

        let base = self.work_dir.join(components[..first_glob].join("/"));
        if !base.is_dir() {
            return Ok(Vec::new());
        }

        let rest = components[first_glob..].join("/");
        let matcher = compile(&rest)?;
        let max_depth = if rest.contains("**") {
            usize::MAX
        } else {
            components.len() - first_glob
        };

        debug!("Globbing {} under {}", rest, base.display());
        let mut matched = Vec::new();
        walk(&base, &base, 1, max_depth, &matcher, &mut matched)?;
        Ok(matched)
    }
}

fn compile(pattern: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|e| StorageError::Pattern(format!("{pattern}: {e}")))
}

fn walk(
    base: &Path,
    dir: &Path,
    depth: usize,
    max_depth: usize,
    matcher: &GlobMatcher,
    out: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| StorageError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        if let Ok(relative) = path.strip_prefix(base) {
            if matcher.is_match(relative) {
                out.push(path.clone());
            }
        }
        // file_type does not follow links; a linked directory could loop.
        let is_real_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_real_dir && depth < max_depth {
            walk(base, &path, depth + 1, max_depth, matcher, out)?;
        }
    }
    Ok(())
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}

fn nested_variant(relative: &str) -> Option<String> {
    let relative = relative.trim_start_matches("./");
    if relative.starts_with(WORKSPACE_PREFIX) && !relative.starts_with(NESTED_PREFIX) {
        Some(relative.replacen(WORKSPACE_PREFIX, NESTED_PREFIX, 1))
    } else {
        None
    }
}

/// First run of ASCII digits in a file name.
pub fn chapter_number(path: &Path) -> Option<u64> {
    let name = path.file_name()?.to_string_lossy();
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Order paths by embedded number (so `10` follows `2`), then by name.
/// Names without a number go last.
pub fn sort_by_chapter_number(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let key = |p: &PathBuf| (chapter_number(p).map_or((1, 0), |n| (0, n)), p.file_name().map(|n| n.to_os_string()));
        key(a).cmp(&key(b))
    });
}

/// File name of a path, lossily converted.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_falls_back_to_nested_workspace() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/workspace/outline.json", "{}");
        let ws = WorkspaceAccessor::new(dir.path());

        let resolved = ws.resolve("workspace/outline.json").unwrap();
        assert!(resolved.ends_with("workspace/workspace/outline.json"));
        assert!(ws.resolve("workspace/missing.json").is_none());
    }

    #[test]
    fn test_glob_orders_numerically() {
        let dir = TempDir::new().unwrap();
        for n in [10, 2, 1] {
            write(dir.path(), &format!("workspace/chapters/chapter_{n}.md"), "x");
        }
        write(dir.path(), "workspace/chapters/notes.txt", "x");
        let ws = WorkspaceAccessor::new(dir.path());

        let names: Vec<_> = ws
            .glob("workspace/chapters/*.md")
            .unwrap()
            .iter()
            .map(|p| file_name(p))
            .collect();
        assert_eq!(names, vec!["chapter_1.md", "chapter_2.md", "chapter_10.md"]);
    }

    #[test]
    fn test_glob_star_does_not_cross_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/characters/a.json", "{}");
        write(dir.path(), "workspace/characters/deep/b.json", "{}");
        let ws = WorkspaceAccessor::new(dir.path());

        assert_eq!(ws.glob("workspace/characters/*.json").unwrap().len(), 1);
        assert_eq!(ws.glob("workspace/characters/**/*.json").unwrap().len(), 2);
    }

    #[test]
    fn test_glob_nested_fallback_and_flexible_prefix() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/workspace/chapters/第1章.md", "x");
        let ws = WorkspaceAccessor::new(dir.path());

        assert_eq!(ws.glob("workspace/chapters/*.md").unwrap().len(), 1);
        assert_eq!(ws.glob_flexible("chapters/").unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_glob_does_not_follow_directory_links() {
        let dir = TempDir::new().unwrap();
        let chapters = dir.path().join("chapters");
        std::fs::create_dir_all(&chapters).unwrap();
        std::fs::write(chapters.join("chapter_1.txt"), "one").unwrap();
        std::os::unix::fs::symlink(dir.path(), chapters.join("loop")).unwrap();

        let ws = WorkspaceAccessor::new(dir.path());
        let found = ws.glob("**/*.txt").unwrap();
        assert_eq!(found, vec![chapters.join("chapter_1.txt")]);
    }

    #[test]
    fn test_flexible_script_suffix() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/scripts/episode_1.json", "{}");
        let ws = WorkspaceAccessor::new(dir.path());

        let matched = ws.glob_flexible("workspace/scripts/episode_1_script.json").unwrap();
        assert_eq!(matched.len(), 1);
    }

    #[test]
    fn test_read_json_reports_position() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "workspace/bad.json", "{\n  \"a\": 1,\n  oops\n}");
        let ws = WorkspaceAccessor::new(dir.path());

        match ws.read_json(&dir.path().join("workspace/bad.json")).unwrap() {
            JsonDocument::Malformed { line, raw, .. } => {
                assert_eq!(line, 3);
                assert!(raw.contains("oops"));
            }
            other => panic!("expected malformed, got {other:?}"),
        }
    }
}
