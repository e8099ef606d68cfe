/*!
 * Job lifecycle: models, cancellation and the controller that runs the
 * extraction → transcription → context → translation → encoding pipeline.
 */

pub mod cancel;
pub mod controller;
pub mod models;

// Re-export main types
pub use cancel::CancelToken;
pub use controller::{ControllerSettings, JobController};
pub use models::{Job, JobErrorInfo, JobState, JobStatus};
