//! # Configuration Module
//!
//! Settings for the realtime server, layered from (lowest to highest priority):
//! - built-in defaults
//! - `config/default.toml`, then `config/{RUN_ENV}.toml`
//! - `APP__`-prefixed environment variables (a `.env` file is read first)
//! - `DATABASE_URL`, `JWT_SECRET`, `SERVER_HOST`, `SERVER_PORT`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chat_realtime::config::Settings;
//!
//! let settings = Settings::load()?;
//! let idle = settings.websocket.typing_idle();
//! ```

mod settings;

pub use settings::*;
