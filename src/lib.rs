//! invenv - run Python scripts in cached virtual environments
//!
//! Each script gets an environment keyed by its requirements file and the
//! interpreter version. Environments are built once, shared between scripts
//! with identical requirements, and guarded by cross-process lock markers so
//! concurrent invocations never corrupt one another.

pub mod builder;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod interpreter;
pub mod requirements;
pub mod settings;
pub mod ui;

pub use error::{InvenvError, InvenvResult};
