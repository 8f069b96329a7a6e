pub mod error;
pub mod types;

pub use error::{Error, GenerationError, Result};
pub use types::{
    Combination, Country, Grade, Language, Subject, SuggestedMessage, TopicRecord, UNKNOWN_NAME,
};
