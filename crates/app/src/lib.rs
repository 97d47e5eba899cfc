#![deny(unsafe_code)]

pub mod cli;
pub mod error;
pub mod settings;
pub mod terminal;

pub use error::{AppError, AppResult};
