//! Filesystem model for Folio.
//!
//! [`entry::Entry`] is the single in-memory representation of a listed
//! item; [`ops`] holds the small stat helpers shared by the enumeration
//! sources and the live update pipeline.

pub mod entry;
pub mod ops;

pub use entry::{Entry, EntryKind, ProviderTag, SyncStatus};
