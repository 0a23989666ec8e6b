//! Internal object model and pack machinery shared by the protocol layer.

pub mod object;
pub mod pack;
pub mod zlib;
