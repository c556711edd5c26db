use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::capture::{Echo, StdEcho};
use crate::config::Config;
use crate::delivery::{CachedCredential, CredentialSource, DiscardTransport, EnvCredential, Transport};
use crate::events::Bus;
use crate::subscribers::Subscribe;

use super::run::Run;
use super::supervisor::RunSupervisor;

/// Builder for a [`RunSupervisor`].
///
/// Defaults: [`Config::from_env`], [`DiscardTransport`], [`EnvCredential`],
/// [`StdEcho`], no subscribers, a fresh cancellation token.
pub struct RunSupervisorBuilder {
    job_name: String,
    cfg: Config,
    transport: Arc<dyn Transport>,
    credential: Box<dyn CredentialSource>,
    echo: Arc<dyn Echo>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    token: Option<CancellationToken>,
}

impl RunSupervisorBuilder {
    /// Creates a builder for a run of `job_name`.
    pub fn new(job_name: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            cfg: Config::from_env(),
            transport: Arc::new(DiscardTransport),
            credential: Box::new(EnvCredential::default()),
            echo: Arc::new(StdEcho),
            subscribers: Vec::new(),
            token: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn with_config(mut self, cfg: Config) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the remote sink.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the credential supplier (cached for `Config::credential_ttl`).
    pub fn with_credential(mut self, source: impl CredentialSource) -> Self {
        self.credential = Box::new(source);
        self
    }

    /// Sets the local echo destination.
    pub fn with_echo(mut self, echo: Arc<dyn Echo>) -> Self {
        self.echo = echo;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive run events through dedicated workers with bounded
    /// queues; a slow subscriber never delays the run.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses an external cancellation token; cancelling it cancels the run.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Builds the supervisor. The run id is assigned here.
    ///
    /// Does not need a tokio runtime; `run` does.
    pub fn build(self) -> RunSupervisor {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let credential = Arc::new(CachedCredential::new(
            self.credential,
            self.cfg.credential_ttl,
        ));
        let run = Arc::new(Run::new(&self.job_name));

        RunSupervisor::new_internal(
            self.cfg,
            run,
            bus,
            self.transport,
            credential,
            self.echo,
            self.subscribers,
            self.token.unwrap_or_else(CancellationToken::new),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::NoEcho;
    use crate::core::run::{Phase, RunState};

    #[test]
    fn build_assigns_identity_without_runtime() {
        let token = CancellationToken::new();
        let sup = RunSupervisorBuilder::new("job")
            .with_config(Config::default())
            .with_echo(Arc::new(NoEcho))
            .with_credential(|| None::<String>)
            .with_cancel_token(token.clone())
            .build();

        let run = sup.run_handle();
        assert_eq!(run.job_name(), "job");
        assert_eq!(run.state(), RunState::Running);
        assert_eq!(run.phase(), Phase::Initializing);
        assert_eq!(sup.run_id(), run.run_id());

        token.cancel();
        assert!(sup.cancel_token().is_cancelled());
    }
}
