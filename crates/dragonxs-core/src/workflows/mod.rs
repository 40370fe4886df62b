//! # Workflows Module
//!
//! High-level entry points that run a complete procedure from composition units
//! to a merged cross-section library.
//!
//! - **Cross-section generation** ([`xs_generation`]) - Renders one deck per
//!   cross-section id, runs DRAGON for every case and merges the resulting libraries.

pub mod xs_generation;
