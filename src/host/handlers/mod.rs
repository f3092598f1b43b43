pub mod common;
pub mod download;
pub mod files;
pub mod git;
pub mod meta;
pub mod process;
