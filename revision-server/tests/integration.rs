//! Entry point for the scenario tests under `tests/integration/`. Cargo only
//! treats direct children of `tests/` as their own test binaries, so this
//! file pulls each scenario module in explicitly.

#[path = "integration/helpers.rs"]
mod helpers;

#[path = "integration/bulk_and_preview.rs"]
mod bulk_and_preview;

#[path = "integration/lazy_migration.rs"]
mod lazy_migration;
