pub mod config_cmd;
pub mod control_cmd;
pub mod inspect;
pub mod run_cmd;
pub mod status;
