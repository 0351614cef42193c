use serde::{Deserialize, Serialize};

use crate::client::Client;
use crate::error::Error;

// Tags API
const TAGS_API: &str = "/api/tags";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Model {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<Model>,
}

impl Client {
    /// Lists the names of the models installed on the server.
    pub async fn models(&self) -> Result<Vec<String>, Error> {
        let response = self.get(TAGS_API).await?;
        let body = response.text().await?;
        let tags: TagsResponse = serde_json::from_str(&body)?;

        log::debug!("found {} models", tags.models.len());

        Ok(tags.models.into_iter().map(|model| model.name).collect())
    }
}
