//! Data models shared by the index, the note store, and front ends.

/// Note metadata records.
pub mod metadata;
