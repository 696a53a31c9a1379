use crate::cli;
use gptchat::auth::KeyPreferences;
use gptchat::config::{Config, DEFAULT_MODEL};
use gptchat::provider::stub::StubTransport;
use gptchat::provider::Transport;
use gptchat::Submission;
use std::path::Path;
use std::sync::Arc;

/// Settings after merging CLI flags over the config file over defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub model: String,
    pub system_prompt: Option<String>,
    pub stream: bool,
    pub endpoint: String,
    pub provider: String,
    pub keys: KeyPreferences,
}

impl Settings {
    pub fn resolve(args: &cli::Args, cfg: Option<&Config>) -> Self {
        let mut keys = cfg.map(|c| c.api.clone()).unwrap_or_default();
        if let Some(source) = args.key_source {
            keys.key_source = source;
        }
        if let Some(name) = &args.key_env {
            keys.key_env = name.clone();
        }

        Self {
            model: args
                .model
                .clone()
                .or_else(|| cfg.and_then(|c| c.model.clone()))
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            system_prompt: args
                .system
                .clone()
                .or_else(|| cfg.and_then(|c| c.system_prompt.clone())),
            stream: !args.no_stream && cfg.and_then(|c| c.stream).unwrap_or(true),
            endpoint: args
                .endpoint
                .clone()
                .or_else(|| cfg.and_then(|c| c.endpoint.clone()))
                .unwrap_or_else(|| gptchat::provider::request::DEFAULT_ENDPOINT.to_string()),
            provider: args
                .provider
                .clone()
                .or_else(|| cfg.and_then(|c| c.provider.clone()))
                .unwrap_or_else(|| "openai".to_string()),
            keys,
        }
    }

    pub fn submission(&self, prompt: impl Into<String>) -> Submission {
        Submission {
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            prompt: prompt.into(),
            stream: self.stream,
        }
    }
}

pub fn build_transport(settings: &Settings) -> anyhow::Result<Arc<dyn Transport>> {
    match settings.provider.as_str() {
        "openai" => {
            #[cfg(feature = "openai")]
            {
                let t = gptchat::provider::openai::OpenAiTransport::new(&settings.endpoint)?;
                Ok(Arc::new(t))
            }
            #[cfg(not(feature = "openai"))]
            {
                anyhow::bail!("openai transport is not enabled in this build")
            }
        }
        "stub" => Ok(Arc::new(StubTransport::new())),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

pub fn cmd_config(settings: &Settings, config_path: &Path, loaded: bool) -> anyhow::Result<()> {
    use std::io::Write;

    let mut out = std::io::stdout().lock();
    writeln!(
        out,
        "config file:  {}{}",
        config_path.display(),
        if loaded { "" } else { " (not found)" }
    )?;
    writeln!(out, "provider:     {}", settings.provider)?;
    writeln!(out, "endpoint:     {}", settings.endpoint)?;
    writeln!(out, "model:        {}", settings.model)?;
    writeln!(out, "stream:       {}", settings.stream)?;
    writeln!(
        out,
        "system:       {}",
        settings.system_prompt.as_deref().unwrap_or("(none)")
    )?;
    writeln!(
        out,
        "key source:   {:?} (env: {})",
        settings.keys.key_source, settings.keys.key_env
    )?;
    match settings.keys.resolve() {
        Some(c) => writeln!(out, "api key:      {}", c.masked())?,
        None => writeln!(out, "api key:      (missing)")?,
    }
    Ok(())
}
