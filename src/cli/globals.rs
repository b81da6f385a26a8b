use std::path::PathBuf;
use url::Url;

/// Client-wide settings resolved once at startup and passed to every action.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub api_url: Url,
    pub state_dir: PathBuf,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(api_url: Url, state_dir: PathBuf) -> Self {
        Self { api_url, state_dir }
    }
}
