//! redb table definitions for the model registry.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! record types). Models and flavors are keyed by uuid, hosts by their
//! unique hostname.

use redb::TableDefinition;

/// Model records keyed by model id (uuid).
pub const MODELS: TableDefinition<&str, &[u8]> = TableDefinition::new("models");

/// Compute host records keyed by hostname.
pub const HOSTS: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");

/// Flavor records keyed by flavor id (uuid).
pub const FLAVORS: TableDefinition<&str, &[u8]> = TableDefinition::new("flavors");
