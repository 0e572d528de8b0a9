mod huggingface;
mod ollama;

pub mod llm;
