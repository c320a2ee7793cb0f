//! CLI command implementations

pub mod config;
pub mod db;
pub mod jobs;
pub mod run;
pub mod stores;

pub use config::ConfigCommand;
pub use db::DbCommand;
pub use jobs::JobsCommand;
pub use run::RunCommand;
pub use stores::StoresCommand;
