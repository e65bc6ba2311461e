pub mod codegen;
pub mod job;
pub mod pool;

pub use codegen::{
    CodeGenerationRunner, CHECKPOINT_EXTRACT, CHECKPOINT_GENERATE, CHECKPOINT_VERIFY,
    COMPLETE_MESSAGE,
};
pub use job::{CodeGenerationJob, CodeGenerationResult, JobResult, ProjectSource, QueuedJob};
pub use pool::WorkerPool;
