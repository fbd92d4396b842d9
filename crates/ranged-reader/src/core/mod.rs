//! Pure transformations for part bookkeeping.
//!
//! Nothing in this module performs I/O; the effects layer computes every
//! issued range through these functions.

mod layout;

pub use layout::{ByteRange, PartLayout};
