pub mod message_store;
pub mod migrations;

pub use message_store::{MessageStore, UploadReport};
