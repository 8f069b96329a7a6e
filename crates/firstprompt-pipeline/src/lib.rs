pub mod batch;
pub mod checkpoint;
pub mod stages;

pub use batch::{BatchOptions, BatchOrchestrator, BatchOutcome, ItemFailure};
pub use checkpoint::{
    CheckpointRow, CheckpointWriter, read_checkpoint, read_message_checkpoint,
    read_topic_checkpoint, recover_checkpoint,
};
pub use stages::{GenerationContext, StageReport, generate_prompts, generate_topics};
