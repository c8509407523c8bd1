//! Engine error type.

use crate::config::ConfigError;
use crate::driver::DriverError;
use crate::eval::EvalError;
use thiserror::Error;
use weft_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("dependency cycle: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("unknown model in selector: `{0}`")]
    UnknownSelector(String),
    #[error("failed to render `{path}`: {message}")]
    Render { path: String, message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
