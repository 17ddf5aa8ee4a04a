//! Virtual filesystem engine
//!
//! Responsibilities:
//! - Classify every requested path into one entity kind (`path`).
//! - Implement each filesystem operation against the live dataset,
//!   rendering through the representation codecs (`engine`).
//! - Enforce the referential invariants, in particular the two-phase
//!   dimension rename protocol that keeps dimensions and their coordinate
//!   variables coupled.
//!
//! The engine is path-based and stateless: every call re-derives what it
//! needs from the path and the dataset handle. The FUSE adapter in
//! `crate::fuse` translates inode-based kernel requests onto it.

pub mod engine;
pub mod error;
pub mod path;

pub use engine::{FileStat, NcFs};
pub use error::{FsError, FsResult};
pub use path::{DATA_REPR, DIMENSIONS, PathKind, classify};
