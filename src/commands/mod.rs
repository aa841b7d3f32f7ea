pub mod add;
pub mod edit;
pub mod list;
pub mod lock;
pub mod remove;
pub mod search;
pub mod show;
pub mod sync;
pub mod task;
