//! CLI command implementations.
//!
//! | Module   | Commands handled   |
//! |----------|--------------------|
//! | `serve`  | `Serve`, `InitDb`  |
//! | `cron`   | `Cron`             |
//! | `config` | `Config`           |

pub mod config;
pub mod cron;
pub mod serve;

pub use config::{cmd_config, cmd_config_init};
pub use cron::cmd_cron;
pub use serve::{cmd_init_db, cmd_serve};
