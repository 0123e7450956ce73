pub mod error;
pub mod model;
pub mod service;

pub use error::EpisodeServiceError;
pub use model::{
    episode_key, DeleteReceipt, EpisodeDocument, EpisodeListing, SaveReceipt,
    SentenceUpdateReceipt,
};
pub use service::{EpisodeService, EpisodeServiceApi};
