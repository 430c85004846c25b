//! Core application plumbing shared by the library and the binary.

mod config;

pub use config::{
    Config, GeneralConfig, GitConfig, GitHubConfig, LlmConfig, OutputConfig, LOCAL_CONFIG_FILE,
};
