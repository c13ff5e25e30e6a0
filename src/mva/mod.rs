//! Learning-results engine on `Signal`: decomposition, blind source
//! separation, model reconstruction and component manipulation.
//!
//! Everything here is an inherent method of `Signal<A>`; the results are
//! written to and read from the signal's own `LearningResults`.

mod engine;
mod model;
