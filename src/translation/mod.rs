/*!
 * Context building and segment translation.
 *
 * Submodules:
 *
 * - `retry`: shared retry, backoff and timeout policy for generation calls
 * - `prompts`: pure prompt construction and batch marker parsing
 * - `context`: the job-wide context and its builder
 * - `coordinator`: concurrent per-segment translation with partial-failure semantics
 */

// Re-export main types for easier usage
pub use self::context::{ContextBuilder, JobContext};
pub use self::coordinator::{ProgressCallback, TranslationControl, TranslationCoordinator};
pub use self::retry::RetryPolicy;

// Submodules
pub mod context;
pub mod coordinator;
pub mod prompts;
pub mod retry;
