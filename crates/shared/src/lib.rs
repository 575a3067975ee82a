//! Domain and wire types shared by the scanner client and its front ends.

pub mod domain;
pub mod error;
pub mod protocol;
