// The infra module contains implementations of core traits.
// Each external system gets its own submodule.

#[path = "postgres/mod.rs"]
pub mod postgres;

#[path = "google/mod.rs"]
pub mod google;

#[path = "docx/mod.rs"]
pub mod docx;
