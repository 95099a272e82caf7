mod file;
mod share;

pub use file::*;
pub use share::*;
