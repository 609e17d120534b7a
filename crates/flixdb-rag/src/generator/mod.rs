pub mod openai;
pub mod prompt;

pub use openai::OpenAiGenerator;
pub use prompt::{build_prompt, SYSTEM_PROMPT};
