pub mod serve;
pub mod show_config;
