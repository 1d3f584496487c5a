pub mod app;
pub mod audit;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod markers;
pub mod output;
pub mod run;
pub mod runtime;

pub use audit::{cmd_audit, AuditArgs};
pub use config::{cmd_config, ConfigArgs};
pub use info::cmd_info;
pub use markers::cmd_markers;
pub use run::{cmd_run, RunArgs};
