use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("invalid trigger pattern in rule '{rule}': {reason}")]
    InvalidPattern { rule: String, reason: String },

    #[error("signature verification failed")]
    BadSignature,

    #[error("missing header '{0}'")]
    MissingHeader(&'static str),

    #[error("failed to bind the trigger listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("failed to deliver a trigger response: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error(transparent)]
    Schedule(#[from] waveforge_cron::ScheduleError),
}

pub type TriggerResult<T> = Result<T, TriggerError>;
