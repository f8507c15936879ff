pub mod check;
pub mod config;
pub mod utils;

pub use check::{check_keys, CheckOptions};
pub use config::{handle_config_command, ConfigCommands};
