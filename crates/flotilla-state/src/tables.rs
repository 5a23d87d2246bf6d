//! redb table definitions for the Flotilla stores.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Tag keys are composite: `{entity_type}:{entity_id}:{key}`.

use redb::TableDefinition;

/// Job records keyed by `{job_id}`.
pub const JOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("jobs");

/// Tag records keyed by `{entity_type}:{entity_id}:{key}`.
pub const TAGS: TableDefinition<&str, &[u8]> = TableDefinition::new("tags");
