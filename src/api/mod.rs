pub mod health;
pub mod models;
pub mod native_chat;
pub mod openai_chat;
pub mod tokens;
