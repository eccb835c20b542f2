pub mod chunking;
pub mod ndjson;
pub mod ollama;
pub mod prompts;
pub mod relay;

pub mod mock;

pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use relay::RelayProvider;
