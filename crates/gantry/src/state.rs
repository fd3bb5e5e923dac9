use std::fmt;

/// Pipeline stages. Every non-terminal state may fall into [`Failed`](Self::Failed);
/// nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    Building,
    Publishing,
    Deploying,
    Waiting,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Validating => "validating",
            PipelineState::Building => "building",
            PipelineState::Publishing => "publishing",
            PipelineState::Deploying => "deploying",
            PipelineState::Waiting => "waiting",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    /// The state a successful stage hands over to.
    pub fn next(self) -> Option<Self> {
        match self {
            PipelineState::Validating => Some(PipelineState::Building),
            PipelineState::Building => Some(PipelineState::Publishing),
            PipelineState::Publishing => Some(PipelineState::Deploying),
            PipelineState::Deploying => Some(PipelineState::Waiting),
            PipelineState::Waiting => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
