#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{program} CLI not found on PATH")]
    NotFound {
        program: &'static str,
        source: std::io::Error,
    },

    #[error("{program} command failed: {args:?}\n{stderr}")]
    CommandFailed {
        program: &'static str,
        args: Vec<String>,
        stderr: String,
    },

    #[error("{program} output was not valid UTF-8")]
    InvalidUtf8 {
        program: &'static str,
        source: std::string::FromUtf8Error,
    },

    #[error("failed to write to {program} stdin")]
    StdinWrite {
        program: &'static str,
        source: std::io::Error,
    },
}
