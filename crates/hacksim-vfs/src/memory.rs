//! In-memory virtual file system.
//!
//! Two maps describe the whole tree: `entries` maps every directory to the
//! ordered list of its child names, and `contents` maps file paths to their
//! text. A name is a directory iff its full path is also a key of `entries`.
//! A name listed by its parent but absent from `contents` is an empty file.
//!
//! Every mutator validates before touching either map, so a failed call
//! leaves the tree exactly as it was.

use std::collections::{BTreeMap, HashSet};

use hacksim_types::error::{HackError, Result};
use serde::{Deserialize, Serialize};

use crate::path::{self, ROOT};

/// Serializable deep copy of a [`VirtualFilesystem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemSnapshot {
    /// Directory path -> ordered child names.
    pub entries: BTreeMap<String, Vec<String>>,
    /// File path -> text content.
    #[serde(default)]
    pub contents: BTreeMap<String, String>,
}

/// What a path currently names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// A fully in-memory virtual file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFilesystem {
    entries: BTreeMap<String, Vec<String>>,
    contents: BTreeMap<String, String>,
}

impl VirtualFilesystem {
    /// Create a file system holding only the empty root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(ROOT.to_string(), Vec::new());
        Self {
            entries,
            contents: BTreeMap::new(),
        }
    }

    /// Rebuild a file system from a snapshot, rejecting inconsistent trees.
    ///
    /// A snapshot without a root entry gets an empty root.
    pub fn from_snapshot(snapshot: FilesystemSnapshot) -> Result<Self> {
        let mut vfs = Self {
            entries: snapshot.entries,
            contents: snapshot.contents,
        };
        vfs.entries.entry(ROOT.to_string()).or_default();
        vfs.check_invariants()?;
        Ok(vfs)
    }

    /// Deep copy of the current state.
    pub fn snapshot(&self) -> FilesystemSnapshot {
        FilesystemSnapshot {
            entries: self.entries.clone(),
            contents: self.contents.clone(),
        }
    }

    // -- Queries --

    /// Whether `path` is a known directory.
    pub fn is_dir(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Whether `path` is listed by its parent directory (or is the root).
    pub fn exists(&self, path: &str) -> bool {
        path == ROOT || self.is_listed(path)
    }

    /// Whether `path` names a file.
    pub fn is_file(&self, path: &str) -> bool {
        path != ROOT && self.is_listed(path) && !self.is_dir(path)
    }

    /// Classify `path`, or `None` if nothing lives there.
    pub fn kind(&self, path: &str) -> Option<NodeKind> {
        if self.is_dir(path) {
            Some(NodeKind::Directory)
        } else if self.is_file(path) {
            Some(NodeKind::File)
        } else {
            None
        }
    }

    /// Child names of a directory in insertion order.
    pub fn children(&self, dir: &str) -> Option<&[String]> {
        self.entries.get(dir).map(Vec::as_slice)
    }

    /// Stored content of a file; `None` if the file has none.
    pub fn content(&self, path: &str) -> Option<&str> {
        self.contents.get(path).map(String::as_str)
    }

    /// Number of directories, root included.
    pub fn dir_count(&self) -> usize {
        self.entries.len()
    }

    fn is_listed(&self, path: &str) -> bool {
        let name = path::file_name(path);
        self.entries
            .get(path::parent(path))
            .is_some_and(|kids| kids.iter().any(|k| k == name))
    }

    // -- Mutators --

    /// Create every missing directory along `path`.
    ///
    /// Each missing prefix is attached to its immediate parent. Fails with
    /// `MissingParent` when a prefix is taken by a file, in which case
    /// nothing is created.
    pub fn materialize(&mut self, target: &str) -> Result<()> {
        let mut missing = Vec::new();
        for prefix in path::prefixes(target) {
            if self.is_dir(&prefix) {
                continue;
            }
            if self.is_listed(&prefix) {
                return Err(HackError::MissingParent(format!(
                    "{prefix} is a file, not a directory"
                )));
            }
            let par = path::parent(&prefix);
            if !self.is_dir(par) && !missing.iter().any(|m: &String| m == par) {
                return Err(HackError::MissingParent(par.to_string()));
            }
            missing.push(prefix);
        }
        for dir in missing {
            self.attach(&dir);
            self.entries.insert(dir, Vec::new());
        }
        Ok(())
    }

    /// Create an empty directory. The parent must already exist.
    pub fn create_dir(&mut self, target: &str) -> Result<()> {
        self.check_creatable(target)?;
        self.attach(target);
        self.entries.insert(target.to_string(), Vec::new());
        Ok(())
    }

    /// Create a file with the given content. The parent must already exist.
    pub fn create_file(&mut self, target: &str, content: &str) -> Result<()> {
        self.check_creatable(target)?;
        self.attach(target);
        self.contents.insert(target.to_string(), content.to_string());
        Ok(())
    }

    /// Replace a file's content, creating the file if needed.
    ///
    /// Missing parent directories are materialized first.
    pub fn write_file(&mut self, target: &str, content: &str) -> Result<()> {
        if target == ROOT || self.is_dir(target) {
            return Err(HackError::InvalidArgument(format!(
                "{target} is a directory"
            )));
        }
        let par = path::parent(target);
        if !self.is_dir(par) {
            self.materialize(par)?;
        }
        if !self.is_listed(target) {
            self.attach(target);
        }
        self.contents.insert(target.to_string(), content.to_string());
        Ok(())
    }

    /// Remove a file or directory.
    ///
    /// Non-empty directories require `recursive`; descendants are deleted
    /// deepest first, then the directory, then its parent's listing.
    pub fn remove(&mut self, target: &str, recursive: bool) -> Result<()> {
        if target == ROOT {
            return Err(HackError::InvalidArgument(
                "refusing to remove /".to_string(),
            ));
        }
        if !self.is_listed(target) {
            return Err(HackError::NotFound(target.to_string()));
        }
        if let Some(kids) = self.entries.get(target)
            && !kids.is_empty()
            && !recursive
        {
            return Err(HackError::NotEmpty(target.to_string()));
        }

        let mut doomed = self.walk(target);
        doomed.reverse();
        for p in doomed {
            self.entries.remove(&p);
            self.contents.remove(&p);
        }
        self.entries.remove(target);
        self.contents.remove(target);

        let name = path::file_name(target);
        if let Some(kids) = self.entries.get_mut(path::parent(target)) {
            kids.retain(|k| k != name);
        }
        Ok(())
    }

    fn check_creatable(&self, target: &str) -> Result<()> {
        if target == ROOT {
            return Err(HackError::AlreadyExists(ROOT.to_string()));
        }
        let par = path::parent(target);
        if !self.is_dir(par) {
            return Err(HackError::MissingParent(par.to_string()));
        }
        if self.is_listed(target) {
            return Err(HackError::AlreadyExists(target.to_string()));
        }
        Ok(())
    }

    /// Register `target` in its parent's child list. The parent must exist.
    fn attach(&mut self, target: &str) {
        if let Some(kids) = self.entries.get_mut(path::parent(target)) {
            kids.push(path::file_name(target).to_string());
        }
    }

    // -- Consistency --

    /// Verify the structural invariants of the tree.
    ///
    /// - every directory other than `/` is listed exactly once by its parent,
    ///   and that parent is itself a directory
    /// - child lists hold no duplicates and no names containing `/`
    /// - every stored content belongs to a listed file, never a directory
    pub fn check_invariants(&self) -> Result<()> {
        for (dir, kids) in &self.entries {
            let mut seen = HashSet::new();
            for kid in kids {
                if kid.is_empty() || kid.contains('/') {
                    return Err(HackError::InvalidArgument(format!(
                        "invalid child name {kid:?} in {dir}"
                    )));
                }
                if !seen.insert(kid.as_str()) {
                    return Err(HackError::InvalidArgument(format!(
                        "{kid} listed twice in {dir}"
                    )));
                }
            }
            if dir == ROOT {
                continue;
            }
            if !dir.starts_with('/') {
                return Err(HackError::InvalidArgument(format!(
                    "directory {dir} is not absolute"
                )));
            }
            let par = path::parent(dir);
            if !self.entries.contains_key(par) {
                return Err(HackError::MissingParent(format!(
                    "{dir} has no parent directory {par}"
                )));
            }
            if !self.is_listed(dir) {
                return Err(HackError::InvalidArgument(format!(
                    "{dir} is not listed by {par}"
                )));
            }
        }
        for file in self.contents.keys() {
            if self.entries.contains_key(file) {
                return Err(HackError::InvalidArgument(format!(
                    "{file} is both a directory and a file"
                )));
            }
            if !self.is_listed(file) {
                return Err(HackError::InvalidArgument(format!(
                    "{file} has content but is not listed"
                )));
            }
        }
        Ok(())
    }
}

impl Default for VirtualFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VirtualFilesystem {
        let mut vfs = VirtualFilesystem::new();
        vfs.create_dir("/missions").unwrap();
        vfs.create_dir("/missions/intro").unwrap();
        vfs.create_file("/missions/intro/briefing.txt", "Bienvenue")
            .unwrap();
        vfs.create_file("/notes.txt", "").unwrap();
        vfs
    }

    #[test]
    fn root_exists() {
        let vfs = VirtualFilesystem::new();
        assert!(vfs.is_dir("/"));
        assert!(vfs.exists("/"));
        assert_eq!(vfs.children("/").unwrap().len(), 0);
    }

    #[test]
    fn create_dir_registers_in_parent() {
        let vfs = sample();
        assert_eq!(vfs.children("/").unwrap(), ["missions", "notes.txt"]);
        assert_eq!(vfs.kind("/missions"), Some(NodeKind::Directory));
        assert_eq!(vfs.kind("/notes.txt"), Some(NodeKind::File));
        assert_eq!(vfs.kind("/nope"), None);
    }

    #[test]
    fn children_keep_insertion_order() {
        let mut vfs = VirtualFilesystem::new();
        for name in ["zeta", "alpha", "mid"] {
            vfs.create_dir(&format!("/{name}")).unwrap();
        }
        assert_eq!(vfs.children("/").unwrap(), ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn create_existing_fails() {
        let mut vfs = sample();
        let err = vfs.create_dir("/missions").unwrap_err();
        assert!(matches!(err, HackError::AlreadyExists(_)));
        let err = vfs.create_file("/notes.txt", "x").unwrap_err();
        assert!(matches!(err, HackError::AlreadyExists(_)));
    }

    #[test]
    fn create_without_parent_fails() {
        let mut vfs = VirtualFilesystem::new();
        let before = vfs.clone();
        let err = vfs.create_dir("/a/b").unwrap_err();
        assert!(matches!(err, HackError::MissingParent(_)));
        assert_eq!(vfs, before);
    }

    #[test]
    fn materialize_creates_chain() {
        let mut vfs = VirtualFilesystem::new();
        vfs.materialize("/a/b/c").unwrap();
        assert!(vfs.is_dir("/a"));
        assert!(vfs.is_dir("/a/b"));
        assert!(vfs.is_dir("/a/b/c"));
        assert_eq!(vfs.children("/a").unwrap(), ["b"]);
        vfs.check_invariants().unwrap();
    }

    #[test]
    fn materialize_existing_is_noop() {
        let mut vfs = sample();
        let before = vfs.clone();
        vfs.materialize("/missions/intro").unwrap();
        assert_eq!(vfs, before);
    }

    #[test]
    fn materialize_through_file_fails_cleanly() {
        let mut vfs = sample();
        let before = vfs.clone();
        let err = vfs.materialize("/notes.txt/sub/deeper").unwrap_err();
        assert!(matches!(err, HackError::MissingParent(_)));
        assert_eq!(vfs, before);
    }

    #[test]
    fn write_file_replaces_content() {
        let mut vfs = sample();
        vfs.write_file("/notes.txt", "first").unwrap();
        vfs.write_file("/notes.txt", "second").unwrap();
        assert_eq!(vfs.content("/notes.txt"), Some("second"));
        assert_eq!(
            vfs.children("/")
                .unwrap()
                .iter()
                .filter(|k| *k == "notes.txt")
                .count(),
            1
        );
    }

    #[test]
    fn write_file_materializes_parents() {
        let mut vfs = VirtualFilesystem::new();
        vfs.write_file("/rapport/2024/rapport.txt", "ok").unwrap();
        assert!(vfs.is_dir("/rapport/2024"));
        assert_eq!(vfs.content("/rapport/2024/rapport.txt"), Some("ok"));
        vfs.check_invariants().unwrap();
    }

    #[test]
    fn write_file_onto_directory_fails() {
        let mut vfs = sample();
        let before = vfs.clone();
        assert!(vfs.write_file("/missions", "x").is_err());
        assert!(vfs.write_file("/", "x").is_err());
        assert_eq!(vfs, before);
    }

    #[test]
    fn remove_file() {
        let mut vfs = sample();
        vfs.remove("/notes.txt", false).unwrap();
        assert!(!vfs.exists("/notes.txt"));
        assert_eq!(vfs.children("/").unwrap(), ["missions"]);
    }

    #[test]
    fn remove_nonempty_dir_requires_recursive() {
        let mut vfs = sample();
        let before = vfs.clone();
        let err = vfs.remove("/missions/intro", false).unwrap_err();
        assert!(matches!(err, HackError::NotEmpty(_)));
        assert_eq!(vfs, before);
    }

    #[test]
    fn remove_recursive_clears_descendants() {
        let mut vfs = sample();
        vfs.remove("/missions", true).unwrap();
        assert!(!vfs.is_dir("/missions"));
        assert!(!vfs.is_dir("/missions/intro"));
        assert_eq!(vfs.content("/missions/intro/briefing.txt"), None);
        assert_eq!(vfs.children("/").unwrap(), ["notes.txt"]);
        vfs.check_invariants().unwrap();
    }

    #[test]
    fn remove_empty_dir_without_flag() {
        let mut vfs = VirtualFilesystem::new();
        vfs.create_dir("/empty").unwrap();
        vfs.remove("/empty", false).unwrap();
        assert!(!vfs.exists("/empty"));
    }

    #[test]
    fn remove_missing_fails() {
        let mut vfs = sample();
        assert!(matches!(
            vfs.remove("/ghost", true).unwrap_err(),
            HackError::NotFound(_)
        ));
    }

    #[test]
    fn remove_root_fails() {
        let mut vfs = sample();
        assert!(vfs.remove("/", true).is_err());
    }

    #[test]
    fn snapshot_round_trip() {
        let vfs = sample();
        let json = serde_json::to_string(&vfs.snapshot()).unwrap();
        let snap: FilesystemSnapshot = serde_json::from_str(&json).unwrap();
        let restored = VirtualFilesystem::from_snapshot(snap).unwrap();
        assert_eq!(restored, vfs);
    }

    #[test]
    fn from_snapshot_rejects_orphan_directory() {
        let mut snap = FilesystemSnapshot::default();
        snap.entries.insert("/".into(), vec![]);
        snap.entries.insert("/orphan".into(), vec![]);
        assert!(VirtualFilesystem::from_snapshot(snap).is_err());
    }

    #[test]
    fn from_snapshot_rejects_duplicate_children() {
        let mut snap = FilesystemSnapshot::default();
        snap.entries
            .insert("/".into(), vec!["a".into(), "a".into()]);
        assert!(VirtualFilesystem::from_snapshot(snap).is_err());
    }

    #[test]
    fn from_snapshot_rejects_dir_with_content() {
        let mut snap = FilesystemSnapshot::default();
        snap.entries.insert("/".into(), vec!["a".into()]);
        snap.entries.insert("/a".into(), vec![]);
        snap.contents.insert("/a".into(), "text".into());
        assert!(VirtualFilesystem::from_snapshot(snap).is_err());
    }

    #[test]
    fn from_snapshot_adds_missing_root() {
        let vfs = VirtualFilesystem::from_snapshot(FilesystemSnapshot::default()).unwrap();
        assert!(vfs.is_dir("/"));
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Mkdir(Vec<String>),
            Touch(Vec<String>),
            Write(Vec<String>, String),
            Rm(Vec<String>, bool),
            Materialize(Vec<String>),
        }

        fn segs() -> impl Strategy<Value = Vec<String>> {
            proptest::collection::vec("[abc]", 1..4)
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                segs().prop_map(Op::Mkdir),
                segs().prop_map(Op::Touch),
                (segs(), "[a-z ]{0,8}").prop_map(|(s, t)| Op::Write(s, t)),
                (segs(), any::<bool>()).prop_map(|(s, r)| Op::Rm(s, r)),
                segs().prop_map(Op::Materialize),
            ]
        }

        fn p(segs: &[String]) -> String {
            format!("/{}", segs.join("/"))
        }

        proptest! {
            #[test]
            fn invariants_hold_after_any_ops(ops in proptest::collection::vec(op(), 0..40)) {
                let mut vfs = VirtualFilesystem::new();
                for op in ops {
                    let before = vfs.clone();
                    let result = match &op {
                        Op::Mkdir(s) => vfs.create_dir(&p(s)),
                        Op::Touch(s) => vfs.create_file(&p(s), ""),
                        Op::Write(s, t) => vfs.write_file(&p(s), t),
                        Op::Rm(s, r) => vfs.remove(&p(s), *r),
                        Op::Materialize(s) => vfs.materialize(&p(s)),
                    };
                    if result.is_err() {
                        prop_assert_eq!(&vfs, &before, "failed {:?} mutated the tree", op);
                    }
                    prop_assert!(vfs.check_invariants().is_ok(), "after {:?}", op);
                }
            }

            #[test]
            fn created_paths_round_trip(
                segments in proptest::collection::vec("[a-z]{1,6}", 1..5),
            ) {
                let mut vfs = VirtualFilesystem::new();
                let target = p(&segments);
                vfs.materialize(&target).unwrap();
                prop_assert!(vfs.is_dir(&target));
                prop_assert_eq!(crate::path::resolve(&target, "/"), target.clone());
            }
        }
    }
}
