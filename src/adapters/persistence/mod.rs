//! Persistence Adapters - File-backed Preference Storage
//!
//! Implements the `PreferenceStore` port with a single JSON document
//! written atomically (tmp file, then rename). No database dependency.

pub mod preferences;

pub use preferences::JsonPreferenceStore;
