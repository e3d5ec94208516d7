//! Stack-based traversals over the directory tree.

use crate::memory::VirtualFilesystem;
use crate::path;

/// Rendered output of [`VirtualFilesystem::render_tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeRender {
    /// One line per node, the root first.
    pub lines: Vec<String>,
    /// Directories below the root.
    pub dirs: usize,
    /// Files below the root.
    pub files: usize,
}

struct Frame {
    path: String,
    prefix: String,
    is_last: bool,
}

impl VirtualFilesystem {
    /// Every path below `root` in pre-order, children in listing order.
    ///
    /// Returns an empty list when `root` is not a directory.
    pub fn walk(&self, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack: Vec<String> = match self.children(root) {
            Some(kids) => kids.iter().rev().map(|k| path::join(root, k)).collect(),
            None => return out,
        };
        while let Some(current) = stack.pop() {
            if let Some(kids) = self.children(&current) {
                stack.extend(kids.iter().rev().map(|k| path::join(&current, k)));
            }
            out.push(current);
        }
        out
    }

    /// Render the subtree under `root` with box-drawing connectors.
    ///
    /// The last child of each directory gets `└── `, the others `├── `.
    /// Returns `None` when `root` is not a directory.
    pub fn render_tree(&self, root: &str) -> Option<TreeRender> {
        let kids = self.children(root)?;
        let mut render = TreeRender {
            lines: vec![root.to_string()],
            dirs: 0,
            files: 0,
        };
        let mut stack = child_frames(root, kids, "");
        while let Some(frame) = stack.pop() {
            let connector = if frame.is_last { "└── " } else { "├── " };
            let name = path::file_name(&frame.path);
            match self.children(&frame.path) {
                Some(grandkids) => {
                    render.dirs += 1;
                    render
                        .lines
                        .push(format!("{}{connector}{name}/", frame.prefix));
                    let child_prefix = if frame.is_last {
                        format!("{}    ", frame.prefix)
                    } else {
                        format!("{}│   ", frame.prefix)
                    };
                    stack.extend(child_frames(&frame.path, grandkids, &child_prefix));
                },
                None => {
                    render.files += 1;
                    render
                        .lines
                        .push(format!("{}{connector}{name}", frame.prefix));
                },
            }
        }
        Some(render)
    }
}

/// Frames for a directory's children, reversed so the first child pops first.
fn child_frames(dir: &str, kids: &[String], prefix: &str) -> Vec<Frame> {
    let count = kids.len();
    kids.iter()
        .enumerate()
        .rev()
        .map(|(i, k)| Frame {
            path: path::join(dir, k),
            prefix: prefix.to_string(),
            is_last: i + 1 == count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VirtualFilesystem {
        let mut vfs = VirtualFilesystem::new();
        vfs.create_dir("/logs").unwrap();
        vfs.create_file("/logs/auth.log", "fail\nok").unwrap();
        vfs.create_dir("/logs/old").unwrap();
        vfs.create_file("/logs/old/2019.log", "").unwrap();
        vfs.create_file("/readme.txt", "hi").unwrap();
        vfs
    }

    #[test]
    fn walk_is_preorder() {
        let vfs = sample();
        assert_eq!(
            vfs.walk("/"),
            vec![
                "/logs",
                "/logs/auth.log",
                "/logs/old",
                "/logs/old/2019.log",
                "/readme.txt",
            ]
        );
    }

    #[test]
    fn walk_subtree() {
        let vfs = sample();
        assert_eq!(vfs.walk("/logs/old"), vec!["/logs/old/2019.log"]);
    }

    #[test]
    fn walk_non_directory_is_empty() {
        let vfs = sample();
        assert!(vfs.walk("/readme.txt").is_empty());
        assert!(vfs.walk("/ghost").is_empty());
    }

    #[test]
    fn tree_connectors() {
        let vfs = sample();
        let render = vfs.render_tree("/").unwrap();
        assert_eq!(
            render.lines,
            vec![
                "/",
                "├── logs/",
                "│   ├── auth.log",
                "│   └── old/",
                "│       └── 2019.log",
                "└── readme.txt",
            ]
        );
        assert_eq!(render.dirs, 2);
        assert_eq!(render.files, 3);
    }

    #[test]
    fn tree_of_empty_dir() {
        let vfs = VirtualFilesystem::new();
        let render = vfs.render_tree("/").unwrap();
        assert_eq!(render.lines, vec!["/"]);
        assert_eq!(render.dirs + render.files, 0);
    }

    #[test]
    fn tree_of_file_is_none() {
        assert!(sample().render_tree("/readme.txt").is_none());
    }
}
