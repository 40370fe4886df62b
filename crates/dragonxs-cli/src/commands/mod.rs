pub mod cache;
pub mod run;
