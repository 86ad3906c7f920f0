// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "migration/mod.rs"]
pub mod migration;

#[path = "documents/mod.rs"]
pub mod documents;

#[cfg(test)]
#[path = "test_support.rs"]
pub mod test_support;
