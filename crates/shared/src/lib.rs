pub mod chat;
pub mod config;
mod config_env;
pub mod intake;
pub mod models;
pub mod nlu;
pub mod params;
pub mod repos;
pub mod session_params;
