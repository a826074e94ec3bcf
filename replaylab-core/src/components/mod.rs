//! Strategy components: indicators interface, session windows, signal models.

pub mod alternate;
pub mod indicator;
pub mod session;
pub mod signal;
pub mod staged;
