/*!
Process runner: one external command per call, bounded by a timeout.

- `Invocation` describes the argv to run plus the target it concerns and
  the short form echoed back to callers (e.g. `vppctl show version`).
- `CommandRunner` abstracts execution so dispatch and capture logic can be
  tested without kubectl.
- `KubectlRunner` is the real implementation on top of `tokio::process`.

stdout and stderr are captured separately. A non-zero exit, a spawn error
or a timeout all produce `Outcome::Failed`; the child is killed when the
timeout elapses.
*/

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::RelayError;

/* ---- Invocation ---- */

/// CLI reached through `kubectl exec` inside a dataplane pod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCli {
    Vppctl,
    Gobgp,
}

impl RemoteCli {
    pub fn program(&self) -> &'static str {
        match self {
            RemoteCli::Vppctl => "vppctl",
            RemoteCli::Gobgp => "gobgp",
        }
    }

    pub fn default_container<'a>(&self, settings: &'a Settings) -> &'a str {
        match self {
            RemoteCli::Vppctl => &settings.vpp_container,
            RemoteCli::Gobgp => &settings.agent_container,
        }
    }
}

/// A pod inside the dataplane namespace, with the container to exec into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTarget {
    pub pod: String,
    pub namespace: String,
    pub container: String,
}

impl PodTarget {
    /// `namespace/pod`, used as the serialization key for captures.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// What the command runs against (pod name, namespace, ...)
    pub target: String,
    /// Caller-facing form of the command
    pub echo: String,
}

impl Invocation {
    /// `kubectl exec -n <ns> <pod> -c <container> -- <cli> <words...>`
    pub fn exec_in_pod(
        settings: &Settings,
        target: &PodTarget,
        cli: RemoteCli,
        words: &[String],
    ) -> Self {
        let mut args = vec![
            "exec".to_string(),
            "-n".to_string(),
            target.namespace.clone(),
            target.pod.clone(),
            "-c".to_string(),
            target.container.clone(),
            "--".to_string(),
            cli.program().to_string(),
        ];
        args.extend(words.iter().cloned());

        let mut echo_words = vec![cli.program().to_string()];
        echo_words.extend(words.iter().cloned());

        Self {
            program: settings.kubectl.clone(),
            args,
            target: target.pod.clone(),
            echo: shell_words::join(echo_words),
        }
    }

    /// Plain kubectl call (inventory queries, pod listing).
    pub fn kubectl(settings: &Settings, target: &str, args: &[&str]) -> Self {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut echo_words = vec!["kubectl".to_string()];
        echo_words.extend(args.iter().cloned());
        Self {
            program: settings.kubectl.clone(),
            args,
            target: target.to_string(),
            echo: shell_words::join(echo_words),
        }
    }

    /// Full command line, shell-quoted, for logs.
    pub fn command_line(&self) -> String {
        shell_words::join(
            std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str)),
        )
    }
}

/* ---- Result ---- */

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded { output: String },
    Failed { detail: String, timed_out: bool },
}

/// Result of one invocation. Exactly one of output / error detail exists,
/// carried by `Outcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub target: String,
    pub outcome: Outcome,
}

impl CommandResult {
    #[cfg(test)]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    #[cfg(test)]
    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { output } => Some(output),
            Outcome::Failed { .. } => None,
        }
    }

    #[cfg(test)]
    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed { detail, .. } => Some(detail),
        }
    }

    /// Convert into stdout, or a `CommandFailed` error naming target and command.
    pub fn into_output(self) -> Result<String, RelayError> {
        match self.outcome {
            Outcome::Succeeded { output } => Ok(output),
            Outcome::Failed { detail, .. } => Err(RelayError::CommandFailed {
                target: self.target,
                command: self.command,
                detail,
            }),
        }
    }
}

/* ---- Runner ---- */

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> CommandResult;
}

/// Runs invocations as local child processes.
#[derive(Debug, Default, Clone)]
pub struct KubectlRunner;

#[async_trait]
impl CommandRunner for KubectlRunner {
    async fn run(&self, invocation: &Invocation, timeout: Duration) -> CommandResult {
        info!(command = %invocation.command_line(), "executing command");

        let finish = |outcome: Outcome| CommandResult {
            command: invocation.echo.clone(),
            target: invocation.target.clone(),
            outcome,
        };

        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(c) => c,
            Err(e) => {
                warn!(program = %invocation.program, error = %e, "spawn failed");
                return finish(Outcome::Failed {
                    detail: format!("failed to run {}: {e}", invocation.program),
                    timed_out: false,
                });
            }
        };

        // Dropping the pending future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return finish(Outcome::Failed {
                    detail: format!("failed waiting for {}: {e}", invocation.program),
                    timed_out: false,
                });
            }
            Err(_) => {
                warn!(command = %invocation.echo, ?timeout, "command timed out");
                return finish(Outcome::Failed {
                    detail: format!("command timed out after {timeout:?}"),
                    timed_out: true,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !stderr.is_empty() {
            debug!(%stderr, "command stderr");
        }

        if output.status.success() {
            debug!(command = %invocation.echo, "command succeeded");
            finish(Outcome::Succeeded { output: stdout })
        } else {
            let detail = if stderr.is_empty() {
                output.status.to_string()
            } else {
                format!("{} - {stderr}", output.status)
            };
            warn!(command = %invocation.echo, %detail, "command failed");
            finish(Outcome::Failed {
                detail,
                timed_out: false,
            })
        }
    }
}

/* ---- Test double ---- */

#[cfg(test)]
pub mod fake {
    //! Scripted runner recording every invocation.

    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Rule {
        needle: String,
        outcome: Outcome,
    }

    #[derive(Debug, Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<Rule>>,
        log: Mutex<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Commands whose full line contains `needle` succeed with `output`.
        pub fn ok(self, needle: &str, output: &str) -> Self {
            self.push(needle, Outcome::Succeeded { output: output.into() })
        }

        /// Commands whose full line contains `needle` fail with `detail`.
        pub fn fail(self, needle: &str, detail: &str) -> Self {
            self.push(
                needle,
                Outcome::Failed {
                    detail: detail.into(),
                    timed_out: false,
                },
            )
        }

        fn push(self, needle: &str, outcome: Outcome) -> Self {
            self.rules.lock().unwrap().push(Rule {
                needle: needle.into(),
                outcome,
            });
            self
        }

        pub fn calls(&self) -> Vec<Invocation> {
            self.log.lock().unwrap().clone()
        }

        /// Number of recorded calls whose command line contains `needle`.
        pub fn count(&self, needle: &str) -> usize {
            self.calls()
                .iter()
                .filter(|c| c.command_line().contains(needle))
                .count()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, invocation: &Invocation, _timeout: Duration) -> CommandResult {
            self.log.lock().unwrap().push(invocation.clone());
            let line = invocation.command_line();
            let outcome = self
                .rules
                .lock()
                .unwrap()
                .iter()
                .find(|r| line.contains(&r.needle))
                .map(|r| r.outcome.clone())
                .unwrap_or(Outcome::Succeeded {
                    output: String::new(),
                });
            CommandResult {
                command: invocation.echo.clone(),
                target: invocation.target.clone(),
                outcome,
            }
        }
    }
}
