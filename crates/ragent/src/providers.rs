pub mod base;
pub mod configs;
pub mod embedding;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod utils;

#[cfg(test)]
pub mod mock;
