#[macro_use]
extern crate log;

pub mod dataset;
pub mod fuse;
pub mod repr;
pub mod vfs;
