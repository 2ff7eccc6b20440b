//! Storage and artifact access for quillgrade.
//!
//! This crate provides the tolerant [`WorkspaceAccessor`] used by checkers,
//! loaders for checklists and transcripts, and a JSON [`ResultStore`].

#![warn(missing_docs)]

pub mod trait_;
pub mod workspace;
pub mod json_storage;

pub use trait_::{ResultStore, StorageError, Result};
pub use workspace::{chapter_number, file_name, sort_by_chapter_number, EntryInfo, JsonDocument, WorkspaceAccessor};
pub use json_storage::{load_checklist, load_transcript, parse_checklist, JsonResultStore};
