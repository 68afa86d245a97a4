//! Configuration management for partwise.
//!
//! Configuration picks the default model, overrides provider endpoints and
//! keys, and switches instrumentation and logging.
//!
//! # Configuration File Format
//!
//! Configuration is stored in TOML format. The search order is:
//! 1. `./partwise.toml` (project-local)
//! 2. `~/.config/partwise/config.toml` (XDG config)
//!
//! Every section is optional; an absent file yields the defaults.
//!
//! # Usage
//!
//! ```rust,ignore
//! use partwise::config;
//!
//! let config = config::load()?;
//! let model = config.resolve_model(Some("ollama:llama3.2"))?;
//! ```

mod file;
mod types;

pub use file::{from_path, from_str, load, search_paths, xdg_config_dir};

pub use types::{InstrumentationConfig, PartwiseConfig, ProviderOverride};
