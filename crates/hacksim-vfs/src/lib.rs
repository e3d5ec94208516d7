//! Virtual file system for hacksim.
//!
//! A per-session tree of directories and text files, addressed by absolute
//! string paths. [`path`] turns the tokens players type into absolute paths;
//! [`VirtualFilesystem`] holds the tree and keeps it consistent.

mod memory;
pub mod path;
mod walk;

pub use memory::{FilesystemSnapshot, NodeKind, VirtualFilesystem};
pub use walk::TreeRender;
