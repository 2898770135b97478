//! UUID utilities

use uuid::Uuid;

/// Generate a new UUIDv4 (used for scrape task ids)
pub fn generate() -> Uuid {
    Uuid::new_v4()
}
