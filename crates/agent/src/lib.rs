//! Reply generation and the per-message engagement pipeline.
//!
//! 1. **Generation** (`llm`, `openai`) - pluggable text generator with an OpenAI-compatible client
//! 2. **Prompting** (`prompt`) - system prompt plus the customer context block
//! 3. **Replies** (`replies`) - canned fallbacks, blessing personalization, offer composition
//! 4. **Pipeline** (`orchestrator`) - gate, classify, generate, quote, send, persist
//!
//! The generator only drafts prose. Segments, discounts, and cart state are
//! always decided by `vendedor-core`.

pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod prompt;
pub mod replies;

pub use llm::{DisabledGenerator, GenerationError, GenerationRequest, TextGenerator};
pub use openai::OpenAiGenerator;
pub use orchestrator::{
    Collaborators, MessageOrchestrator, MessageOutcome, OrchestratorSettings, ReplySummary,
};
