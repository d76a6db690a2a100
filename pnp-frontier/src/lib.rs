//! Pnp frontier: bounded best-first and unbounded score-ordered containers.

pub mod kbest;
pub mod unbounded;

pub use kbest::KBest;
pub use unbounded::Unbounded;
