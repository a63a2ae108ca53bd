pub mod dispatcher;
pub mod error;
pub mod listener;
pub mod matcher;
pub mod model;
pub mod template;

pub use dispatcher::TriggerDispatcher;
pub use error::{TriggerError, TriggerResult};
pub use listener::HttpTriggerListener;
pub use matcher::{MatchOutcome, TriggerMatch, TriggerMatcher};
pub use model::{IncomingMessage, MessageSource, TriggerRule, TriggerType};
