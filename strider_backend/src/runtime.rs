use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::Agent;
use crate::config::{AgentConfig, Credentials};
use crate::forum::reddit::RedditClient;
use crate::http_client::build_http_client;
use crate::llm_client::LlmClient;
use crate::persona::PersonaState;

/// A fully wired agent, ready for `run_loop`.
pub struct BackendRuntime {
    pub agent: Agent,
}

impl BackendRuntime {
    /// Authenticate, resume persona progress and build the agent. Every error here is
    /// fatal to the process; nothing has been posted yet.
    pub async fn bootstrap(config: AgentConfig, credentials: Credentials) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let timeout = Duration::from_secs(config.http_timeout_secs);
        let http = build_http_client(&credentials.user_agent, Some(timeout))
            .context("failed to build HTTP client")?;

        let reddit = Arc::new(RedditClient::new(http.clone(), &credentials));
        let user = reddit
            .authenticate()
            .await
            .context("platform authentication failed")?;
        tracing::info!("Authenticated as u/{}", user.name);

        let llm = Arc::new(LlmClient::new(
            config.llm_api_url.clone(),
            credentials.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_temperature,
            config.llm_max_tokens,
            http,
        ));
        tracing::info!("Using model {}", llm.model());

        let persona = resume_persona(config.persona_checkpoint_path.as_deref())?;
        tracing::info!("Persona: {}", persona.summary());

        let agent = Agent::new(config, reddit, llm, persona).context("failed to build agent")?;
        Ok(Self { agent })
    }

    pub async fn run(mut self, shutdown: flume::Receiver<()>) {
        self.agent.run_loop(shutdown).await;
    }
}

/// Send one shutdown notice when `signal` fires. If the handler cannot be installed the
/// sender is held forever, so the loop keeps running instead of exiting.
pub async fn forward_interrupt<F>(signal: F, shutdown: flume::Sender<()>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Interrupt received, stopping");
            let _ = shutdown.send_async(()).await;
        }
        Err(e) => {
            tracing::error!("Failed to listen for interrupt: {}", e);
            let _held = shutdown;
            std::future::pending::<()>().await;
        }
    }
}

/// Seed state unless a checkpoint path is configured and the file exists.
fn resume_persona(checkpoint: Option<&str>) -> Result<PersonaState> {
    let Some(path) = checkpoint else {
        return Ok(PersonaState::seed());
    };
    match PersonaState::load_checkpoint(Path::new(path))? {
        Some(persona) => {
            tracing::info!("Resumed persona from {}", path);
            Ok(persona)
        }
        None => {
            tracing::info!("No checkpoint at {}, starting from day 1", path);
            Ok(PersonaState::seed())
        }
    }
}
