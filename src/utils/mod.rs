pub mod exec;
pub mod fs;
pub mod log;
