//! Concrete `ModelDriver` variants.

pub mod noop;
pub mod tensorflow;
