/// Text-generation collaborator used to enrich sentences.
///
/// The client behind it is blocking, so calls are dispatched through a
/// `BlockingPool`.
pub trait TextGenerator: Send + Sync {
    fn translate(&self, text: &str) -> Result<String, String>;

    fn phonetic(&self, text: &str) -> Result<String, String>;

    /// Words or expressions worth studying in `text`, given its translation
    fn highlight(&self, text: &str, translation: &str) -> Result<Vec<String>, String>;
}
