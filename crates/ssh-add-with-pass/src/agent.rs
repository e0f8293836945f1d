//! One complete run: open a session, start the agent, answer its prompt,
//! and tear everything down.

use std::future::Future;
use std::path::Path;

use crate::config::AgentConfig;
use crate::error::PassError;
use crate::interaction::{InteractionLoop, LoopState};
use crate::reporter::Outcome;
use crate::secret::Secret;
use crate::session::PtySession;
use crate::supervisor::Supervisor;

/// Run the agent against `key` and feed it `secret`.
///
/// Teardown runs on every path: after a success verdict the agent is
/// awaited, otherwise it is terminated. The session is closed last.
/// `cancel` is honored both while waiting for a verdict and while waiting
/// for the agent to exit.
pub async fn add_identity<C>(config: &AgentConfig, key: &Path, secret: &Secret, cancel: C) -> Outcome
where
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);

    let pty_config = config.pty_config();
    let mut session = match PtySession::open(&pty_config) {
        Ok(session) => session,
        Err(e) => return Outcome::failed(e),
    };

    let mut args = config.args.clone();
    args.push(key.to_string_lossy().into_owned());

    let supervisor = Supervisor::new(config.terminate_grace);
    let child = match supervisor.spawn(&config.program, &args, &mut session, &pty_config) {
        Ok(child) => child,
        Err(e) => {
            session.close();
            return Outcome::failed(e);
        }
    };

    let output = session.output().clone();
    let verdict = InteractionLoop::new(&config.markers, secret)
        .poll_interval(config.poll_interval)
        .stall_timeout(config.stall_timeout)
        .run(&output, &mut session, cancel.as_mut())
        .await;

    let mut warnings = Vec::new();
    let result = match verdict {
        Ok(LoopState::Success) => {
            tokio::select! {
                status = supervisor.await_exit(child) => status.and_then(|status| {
                    if status.success() {
                        Ok(status)
                    } else {
                        Err(PassError::AgentExit(status))
                    }
                }),
                // Dropping the pending wait kills the child.
                () = cancel.as_mut() => Err(PassError::Cancelled),
            }
        }
        Ok(_) => {
            warnings.extend(supervisor.terminate(child).await);
            Err(PassError::BadSecret)
        }
        Err(e) => {
            warnings.extend(supervisor.terminate(child).await);
            Err(e)
        }
    };

    session.close();
    tracing::debug!(ok = result.is_ok(), warnings = warnings.len(), "run finished");
    Outcome { result, warnings }
}
