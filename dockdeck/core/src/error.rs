use std::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to spawn `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "`docker {args}` failed ({}): {stderr}",
        .exit_code.map_or_else(|| "killed by signal".to_string(), |c| format!("exit code {c}"))
    )]
    CommandFailed {
        args: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("`docker {args}` timed out after {timeout:?}")]
    Timeout { args: String, timeout: Duration },

    #[error("task was dropped before it produced a result")]
    TaskAborted,

    #[error("failed to parse {what}: {message}")]
    Parse { what: &'static str, message: String },

    #[error("no {0} selected")]
    MissingInput(&'static str),
}

impl Error {
    pub(crate) fn parse(what: &'static str, message: impl ToString) -> Self {
        Error::Parse {
            what,
            message: message.to_string(),
        }
    }
}
