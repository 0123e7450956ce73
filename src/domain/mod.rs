pub mod audio;
pub mod enhancement;
pub mod episode;
pub mod identity;
