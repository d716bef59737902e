//! Persistence adapters for concluded sessions

pub mod jsonl;

pub use jsonl::JsonlSessionArchive;
