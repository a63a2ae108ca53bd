//! Fatal error surface for the execution crate. Ordinary task failure (non-zero
//! exit, timeout, cancellation) never reaches here — it is recorded into a
//! [`waveforge_core::model::TaskResult`] instead. These variants are the ones that
//! escape as real errors: programmer errors and conditions the executor cannot recover
//! from on its own (a dependency it was asked to pipe from was never recorded, an `if`
//! expression fails to parse).

use thiserror::Error;
use waveforge_core::error::CoreError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("expression error: {0}")]
    Expression(#[from] CoreError),

    #[error("task '{task_id}' input pipes from '{source_id}', which has no recorded result")]
    PipeSourceMissing { task_id: String, source_id: String },

    #[error("failed to spawn task '{task_id}': {source}")]
    Spawn {
        task_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read input file '{path}' for task '{task_id}': {source}")]
    InputFile {
        task_id: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
