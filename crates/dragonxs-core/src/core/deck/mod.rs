//! Solver input deck generation: energy group structures, template rendering and
//! the writer that turns composition units into a DRAGON case.

pub mod groups;
pub mod template;
pub mod writer;
