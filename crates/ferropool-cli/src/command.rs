//! The external command run once per input item.

use ferropool::Handler;
use std::{io, process::Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Failure of a single command invocation.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait on child process: {0}")]
    Wait(#[source] io::Error),

    /// `code` is `None` when the child was terminated by a signal.
    #[error("command {}", describe_exit(.code))]
    Exit { code: Option<i32> },

    #[error("command cancelled")]
    Cancelled,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => String::from("terminated by signal"),
    }
}

/// Spawns `program args...` for every item, with the item substituted for
/// `placeholder` in each argument.
///
/// When no argument contains the placeholder, the item is appended as the last
/// argument instead. Children inherit stdout and stderr but never stdin, which
/// may be carrying the items themselves.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    program: String,
    args: Vec<String>,
    placeholder: String,
    append: bool,
}

impl CommandHandler {
    pub fn new(program: String, args: Vec<String>, placeholder: String) -> Self {
        let append = !args.iter().any(|arg| arg.contains(&placeholder));
        Self {
            program,
            args,
            placeholder,
            append,
        }
    }

    /// Arguments passed to the program for `item`.
    pub fn args_for(&self, item: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(&self.placeholder, item))
            .collect();
        if self.append {
            args.push(item.to_owned());
        }
        args
    }

    fn command(&self, item: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(self.args_for(item))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

impl Handler<String> for CommandHandler {
    type Error = CommandError;

    fn handle(
        &self,
        ctx: CancellationToken,
        item: String,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let mut command = self.command(&item);
        let program = self.program.clone();

        async move {
            if ctx.is_cancelled() {
                return Err(CommandError::Cancelled);
            }

            let mut child = command
                .spawn()
                .map_err(|source| CommandError::Spawn { program, source })?;

            tracing::trace!("Spawned child {:?} for {item:?}", child.id());

            tokio::select! {
                biased;
                () = ctx.cancelled() => {
                    if let Err(e) = child.kill().await {
                        tracing::warn!("Failed to kill child for {item:?}: {e}");
                    }
                    Err(CommandError::Cancelled)
                }
                status = child.wait() => {
                    let status = status.map_err(CommandError::Wait)?;
                    if status.success() {
                        Ok(())
                    } else {
                        Err(CommandError::Exit { code: status.code() })
                    }
                }
            }
        }
    }
}
