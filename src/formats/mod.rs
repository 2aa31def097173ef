//! Container formats for world data.

pub mod anvil;
