pub mod agent;
pub mod conversation;
pub mod errors;
pub mod models;
pub mod prompt_template;
pub mod providers;
pub mod retrieval;
pub mod services;
pub mod settings;
