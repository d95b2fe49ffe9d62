pub mod app;
pub mod bedrock;
pub mod chunk_decoder;
pub mod config;
pub mod error;
pub mod eventstream;
pub mod handlers;
pub mod language;
pub mod normalize;
pub mod probe;
pub mod profiles;
pub mod prompt;
pub mod relay;
pub mod sigv4;
pub mod translate;
