//! redb table definitions shared by storage modules.

use redb::TableDefinition;

/// File name for the redb database within the configured DB directory.
pub const REDB_FILE_NAME: &str = "data.redb";

/// Per-store CRDT update log keyed by `(store_name, seq)`.
pub const DOC_UPDATES: TableDefinition<(&str, u64), &[u8]> = TableDefinition::new("doc_updates");

/// Schema bookkeeping rows (`SchemaInfo`, bincode-encoded).
pub const SCHEMA_META: TableDefinition<&str, &[u8]> = TableDefinition::new("schema_meta");

/// Key of the schema row inside [`SCHEMA_META`].
pub const SCHEMA_KEY: &str = "schema";
