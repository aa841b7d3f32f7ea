pub mod build_info;
pub mod commands;
pub mod config;
pub mod editor;
pub mod entry_id;
pub mod error;
pub mod git;
pub mod identity;
pub mod model;
pub mod output;
pub mod store;
