pub mod service;

pub use service::{split_into_sentences, EnhancedSentence, EnhancementService};
