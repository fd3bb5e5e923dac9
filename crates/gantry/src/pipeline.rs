use std::path::PathBuf;

use gantry_build::{BuildContext, BuildRecipe, ContextRules};
use gantry_core::{DeployMode, ImageReference, PipelineConfig, RawConfig, ServiceSpec};

use crate::error::PipelineError;
use crate::stages::{DeployTarget, ImageBuilder, OperationWaiter, RegistryPublisher};
use crate::state::PipelineState;

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOutcome {
    pub mode: DeployMode,
    pub image: ImageReference,
    pub url: String,
}

/// One build → publish → deploy → wait run over a project directory.
///
/// A pipeline runs once. Stages execute strictly in sequence; the first
/// error moves it to [`PipelineState::Failed`] and skips the rest.
pub struct Pipeline<B, P, W> {
    project_dir: PathBuf,
    builder: B,
    publisher: P,
    waiter: W,
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl<B, P, W> Pipeline<B, P, W>
where
    B: ImageBuilder,
    P: RegistryPublisher,
    W: OperationWaiter,
{
    pub fn new(project_dir: impl Into<PathBuf>, builder: B, publisher: P, waiter: W) -> Self {
        Self {
            project_dir: project_dir.into(),
            builder,
            publisher,
            waiter,
            state: PipelineState::Validating,
            history: vec![PipelineState::Validating],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// Validate `raw`, select the target with `select`, then run every stage.
    ///
    /// `select` only sees a fully validated configuration.
    pub async fn run<T, F>(
        &mut self,
        raw: RawConfig,
        select: F,
    ) -> Result<DeployOutcome, PipelineError>
    where
        T: DeployTarget,
        F: FnOnce(&PipelineConfig) -> gantry_core::Result<T>,
    {
        if self.state.is_terminal() {
            return Err(PipelineError::AlreadyRan(self.state));
        }

        let result = self.execute(raw, select).await;
        if let Err(e) = &result {
            tracing::error!(stage = %self.state, error = %e, "pipeline failed");
            self.enter(PipelineState::Failed);
        }
        result
    }

    async fn execute<T, F>(
        &mut self,
        raw: RawConfig,
        select: F,
    ) -> Result<DeployOutcome, PipelineError>
    where
        T: DeployTarget,
        F: FnOnce(&PipelineConfig) -> gantry_core::Result<T>,
    {
        let config = raw.validate()?;
        let target = select(&config)?;
        let spec = ServiceSpec::from_config(&config);
        let recipe = BuildRecipe::from_config(&config);
        let registry = config.registry();

        self.advance();
        let context = BuildContext::collect(
            &self.project_dir,
            &ContextRules::from_config(&config.build),
        )?;
        tracing::info!(
            files = context.files().len(),
            fingerprint = %context.fingerprint(),
            "build context collected"
        );
        let local = self.builder.build(context, &recipe).await?;

        self.advance();
        let image = self.publisher.publish(&local, &registry).await?;
        tracing::info!(image = %image, "image published");

        self.advance();
        let operation = target.apply(&image, &spec).await?;

        self.advance();
        let url = self.waiter.wait(&operation).await?;

        self.advance();
        tracing::info!(url = %url, "deployment finished");

        Ok(DeployOutcome {
            mode: config.deploy.mode,
            image,
            url,
        })
    }

    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            self.enter(next);
        }
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::info!(from = %self.state, to = %state, "pipeline state");
        self.state = state;
        self.history.push(state);
    }
}
