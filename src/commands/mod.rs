pub mod app_command;
pub mod form;
pub mod run;

pub use app_command::{AppCommand, HELP};
