use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasteError {
    #[error("paste upload failed: {0}")]
    Upload(String),
}

/// One file inside a multi-file paste.
#[derive(Debug, Clone, Serialize)]
pub struct PasteFile {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct PasteRequest<'a> {
    files: &'a [PasteFile],
}

#[derive(Debug, Deserialize)]
struct PasteResponse {
    id: String,
}

/// Client for a mystbin-compatible paste service. Long codeblocks that would
/// drown a channel get moved there and replaced with a link.
pub struct PasteClient {
    client: Client,
    api_url: String,
    public_url: String,
}

impl PasteClient {
    pub fn new(api_url: impl Into<String>, public_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.into(),
            public_url: public_url.into(),
        }
    }

    /// Upload the files and return the public paste url.
    pub async fn create_paste(&self, files: &[PasteFile]) -> Result<String, PasteError> {
        let resp = self
            .client
            .post(&self.api_url)
            .json(&PasteRequest { files })
            .send()
            .await
            .map_err(|e| PasteError::Upload(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(PasteError::Upload(format!(
                "paste service returned {}",
                resp.status()
            )));
        }

        let paste: PasteResponse = resp
            .json()
            .await
            .map_err(|e| PasteError::Upload(e.to_string()))?;

        Ok(format!(
            "{}/{}",
            self.public_url.trim_end_matches('/'),
            paste.id
        ))
    }
}
