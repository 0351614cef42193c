use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ollama_stream::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::prompt::ModelFormat;
use crate::segmenter::Markers;

/// Settings read from `config.yaml`. Every key is optional.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    /// Default model when none is given on the command line.
    pub model: Option<String>,
    /// Models to fan a prompt out to; `model` wins when both are set.
    pub models: Option<Vec<String>>,
    /// Default custom instructions.
    pub system: Option<String>,
    pub think_start_tag: Option<String>,
    pub think_end_tag: Option<String>,
    pub format: Option<ModelFormat>,
}

impl Config {
    /// Default location: `$OC_ROOT/config.yaml`, else `$HOME/.config/oc/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(root) = env::var("OC_ROOT") {
            return Some(Path::new(&root).join("config.yaml"));
        }

        env::var("HOME")
            .ok()
            .map(|home| Path::new(&home).join(".config/oc/config.yaml"))
    }

    /// Loads the config file. A missing file is an empty config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };

        if !path.is_file() {
            tracing::event!(tracing::Level::DEBUG, "No config file at {:?}", path);
            return Ok(Self::default());
        }

        tracing::event!(tracing::Level::INFO, "Loading config from {:?}", path);
        Self::from_yaml(&fs::read_to_string(&path)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty file deserializes to `null`.
        let config: Option<Self> = serde_yaml::from_str(content)?;
        Ok(config.unwrap_or_default())
    }

    /// Transport settings, falling back to `OLLAMA_BASE_URL` and the defaults.
    pub fn client_config(&self) -> ClientConfig {
        let defaults = ClientConfig::from_env();
        ClientConfig {
            base_url: self.base_url.clone().unwrap_or(defaults.base_url),
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
        }
    }

    /// Thinking span delimiters. Empty tags fall back to the defaults.
    pub fn markers(&self) -> Markers {
        let defaults = Markers::default();
        Markers {
            start: non_empty_tag("thinkStartTag", self.think_start_tag.as_deref()).unwrap_or(defaults.start),
            end: non_empty_tag("thinkEndTag", self.think_end_tag.as_deref()).unwrap_or(defaults.end),
        }
    }

    /// Models to query, in order.
    pub fn model_list(&self) -> Vec<String> {
        match (&self.model, &self.models) {
            (Some(model), _) => vec![model.clone()],
            (None, Some(models)) => models.clone(),
            (None, None) => vec![],
        }
    }
}

fn non_empty_tag(key: &str, tag: Option<&str>) -> Option<String> {
    match tag {
        Some(tag) if tag.trim().is_empty() => {
            tracing::event!(
                tracing::Level::WARN,
                "Ignoring empty `{key}`, using the default marker"
            );
            None
        }
        tag => tag.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reads_camel_case_yaml() {
        let config = Config::from_yaml(
            "baseUrl: http://gpu-box:11434\ntimeoutMs: 5000\nmodels: [qwen3, deepseek-r1]\nthinkStartTag: <reasoning>\nformat: reasoning-tagged\n",
        )
        .unwrap();

        assert_eq!(config.client_config().base_url, "http://gpu-box:11434");
        assert_eq!(config.client_config().timeout_ms, 5000);
        assert_eq!(config.model_list(), vec!["qwen3", "deepseek-r1"]);
        assert_eq!(config.format, Some(ModelFormat::ReasoningTagged));
        assert_eq!(
            config.markers(),
            Markers {
                start: "<reasoning>".to_string(),
                end: "</think>".to_string(),
            }
        );
    }

    #[test]
    fn empty_think_tags_fall_back_to_the_defaults() {
        let config = Config::from_yaml("thinkStartTag: \"\"\nthinkEndTag: \" \"\n").unwrap();

        assert_eq!(config.markers(), Markers::default());
    }

    #[test]
    fn empty_yaml_is_the_default_config() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn single_model_wins_over_the_list() {
        let config = Config {
            model: Some("llama3".to_string()),
            models: Some(vec!["qwen3".to_string()]),
            ..Default::default()
        };

        assert_eq!(config.model_list(), vec!["llama3"]);
    }

    #[test]
    fn missing_file_is_an_empty_config() {
        let config = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap();

        assert_eq!(config, Config::default());
    }
}
