// Specforge - iterative quality refinement for generated specification documents
// Library exports

pub mod config;
pub mod documents;
pub mod providers;
pub mod refine;
pub mod review;
