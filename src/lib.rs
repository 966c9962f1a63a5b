//! Schema health diagnostics for PostgreSQL.
//!
//! A [`snapshot::Snapshot`] of catalog metadata is evaluated by the checks of a
//! [`registry::CheckRegistry`] through the [`checker::DiagnosticEngine`]; the
//! resulting findings can be rendered by [`reporter::Reporter`] or turned into
//! corrective SQL by [`migration::MigrationGenerator`].

pub mod analysis;
pub mod checker;
pub mod config;
pub mod exclusion;
pub mod migration;
pub mod models;
pub mod provider;
pub mod registry;
pub mod reporter;
pub mod snapshot;

#[cfg(test)]
pub(crate) mod fixtures;
