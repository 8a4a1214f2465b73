pub mod providers;

pub use providers::create_client;
pub use providers::openai::OpenAiCompletionClient;
