pub mod config;
pub mod process;

pub use config::*;
pub use process::*;
