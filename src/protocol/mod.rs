pub(crate) mod error_shapes;
pub mod native;
pub mod openai_chat;
pub mod upstream;
