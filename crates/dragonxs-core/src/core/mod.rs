//! # Core Module
//!
//! Stateless building blocks of the pipeline. Nothing in this module spawns
//! processes or keeps state between calls; file access is limited to reading
//! composition files and reading/writing cross-section libraries.
//!
//! - **Nuclides** ([`nuclides`]) - Nuclide identities, library naming and thermal-scattering resolution
//! - **Composition** ([`composition`]) - The composition unit abstraction and a homogenized block model
//! - **Mixtures** ([`mixture`]) - Per-unit nuclide records with self-shielding classification
//! - **Decks** ([`deck`]) - Template data, energy group structures and deck rendering
//! - **Libraries** ([`library`]) - Cross-section library model, codecs and merging
//! - **File I/O** ([`io`]) - Composition input files

pub mod composition;
pub mod deck;
pub mod io;
pub mod library;
pub mod mixture;
pub mod nuclides;
