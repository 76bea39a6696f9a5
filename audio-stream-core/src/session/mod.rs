pub mod lifecycle;
pub mod microphone;
pub mod speaker;
