pub mod episode_repository;
pub mod polly_tts_repository;
pub mod text_generator;
pub mod tts_repository;

pub use episode_repository::EpisodeRepository;
pub use polly_tts_repository::PollySynthesizer;
pub use text_generator::TextGenerator;
pub use tts_repository::SpeechSynthesizer;
