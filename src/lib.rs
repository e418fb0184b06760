//! trackforge: batch tagging, genre remux and export of media files.
//!
//! The heavy lifting lives in the workspace crates (`tf-core`, `tf-tags`,
//! `tf-av`); this crate wires them into a sequential [`batch::BatchDriver`]
//! and the `trackforge` command-line tool.

pub mod batch;
pub mod naming;

pub use batch::{expand_inputs, BatchDriver, MediaItem};
