//! # dragonxs Core Library
//!
//! Prepares DRAGON lattice physics inputs from a composition model, executes the
//! solver for many independent cases with a content-addressed output cache, and
//! merges the per-case cross-section libraries into one consolidated library.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models and pure transforms:
//!   nuclide identities and library naming, composition units, thermal-scattering
//!   resolution, mixture records, deck rendering and the cross-section library model.
//!
//! - **[`engine`]: The Execution Core.** The stateful layer that owns the output cache,
//!   the isolated executor, the task dispatcher and the result merger, together with
//!   pipeline configuration, progress reporting and the error taxonomy.
//!
//! - **[`workflows`]: The Public API.** Ties `core` and `engine` together into complete
//!   procedures such as generating and merging cross sections for a set of units.

pub mod core;
pub mod engine;
pub mod workflows;
