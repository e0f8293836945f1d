//! The prompt/response state machine.
//!
//! [`InteractionLoop`] watches an [`OutputBuffer`], sends the secret once
//! the agent prompts for it, and stops at the first success or failure
//! marker that follows the answered prompt. Verdict text printed before
//! that prompt, such as the result for an earlier key, is not a reply. It ends with a verdict, or with
//! [`PassError::NoTerminalSignal`] when the output closes or stalls first.
//!
//! ```text
//! AwaitingPrompt ──prompt──▶ PassphraseSent ──success──▶ Success
//!                                          └─failure──▶ Failure
//! ```
//!
//! The secret goes through a [`LineSink`] so the loop can run against a
//! real [`PtySession`](crate::session::PtySession) or a recording fake.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::buffer::{OutputBuffer, Snapshot};
use crate::error::{PassError, Result};
use crate::markers::{MarkerKind, MarkerSet};
use crate::secret::Secret;

/// Default interval between output checks when nothing wakes the loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Default time without new output before giving up.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Somewhere a line of input can be written.
pub trait LineSink {
    /// Write `line` followed by a newline.
    fn send_line(&mut self, line: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Where the loop is in the exchange.
///
/// Transitions only move forward. `Success` and `Failure` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the agent to ask for the secret.
    AwaitingPrompt,
    /// The secret has been written; waiting for a verdict.
    PassphraseSent,
    /// The agent accepted the secret.
    Success,
    /// The agent rejected the secret.
    Failure,
}

impl LoopState {
    /// Whether this state ends the loop.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

enum Action {
    /// Carries the offset just past the prompt being answered.
    SendSecret(usize),
    Finish(LoopState),
    Wait,
}

/// Drives one agent interaction to a verdict.
#[derive(Debug)]
pub struct InteractionLoop<'a> {
    markers: &'a MarkerSet,
    secret: &'a Secret,
    poll_interval: Duration,
    stall_timeout: Option<Duration>,
    state: LoopState,
    sends: usize,
    verdict_from: usize,
}

impl<'a> InteractionLoop<'a> {
    /// Create a loop with default timing.
    #[must_use]
    pub const fn new(markers: &'a MarkerSet, secret: &'a Secret) -> Self {
        Self {
            markers,
            secret,
            poll_interval: DEFAULT_POLL_INTERVAL,
            stall_timeout: Some(DEFAULT_STALL_TIMEOUT),
            state: LoopState::AwaitingPrompt,
            sends: 0,
            verdict_from: 0,
        }
    }

    /// Set the longest sleep between output checks.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the stall timeout; `None` waits forever.
    #[must_use]
    pub const fn stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    /// How many times the secret has been written. Never more than one.
    #[must_use]
    pub const fn sends(&self) -> usize {
        self.sends
    }

    fn advance(&mut self, next: LoopState) {
        debug_assert!(
            !self.state.is_terminal() && (next as u8) > (self.state as u8),
            "invalid transition {:?} -> {next:?}",
            self.state
        );
        tracing::debug!(from = ?self.state, to = ?next, "interaction state");
        self.state = next;
    }

    fn evaluate(&self, snapshot: &Snapshot) -> Action {
        match self.state {
            LoopState::AwaitingPrompt => {
                if let Some(found) = self.markers.find(MarkerKind::Prompt, &snapshot.text) {
                    tracing::trace!(marker = found.marker, position = found.position, "prompt seen");
                    Action::SendSecret(found.position + found.marker.len())
                } else {
                    Action::Wait
                }
            }
            LoopState::PassphraseSent => match snapshot
                .text
                .get(self.verdict_from..)
                .and_then(|reply| self.markers.find_verdict(reply))
            {
                Some(found) if found.kind == MarkerKind::Success => {
                    Action::Finish(LoopState::Success)
                }
                Some(_) => Action::Finish(LoopState::Failure),
                None => Action::Wait,
            },
            state @ (LoopState::Success | LoopState::Failure) => Action::Finish(state),
        }
    }

    /// Run until a verdict, end of output, a stall, or `cancel` completes.
    ///
    /// Returns the final state, [`LoopState::Success`] or
    /// [`LoopState::Failure`].
    ///
    /// # Errors
    ///
    /// - [`PassError::Write`] if sending the secret fails
    /// - [`PassError::NoTerminalSignal`] if the output closes or stalls
    ///   before a verdict; the captured output is redacted
    /// - [`PassError::Cancelled`] if `cancel` completes first
    pub async fn run<S, C>(&mut self, output: &OutputBuffer, sink: &mut S, cancel: C) -> Result<LoopState>
    where
        S: LineSink,
        C: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let mut last_len = 0;
        let mut last_change = Instant::now();

        loop {
            let snapshot = output.snapshot();

            match self.evaluate(&snapshot) {
                Action::SendSecret(reply_start) => {
                    sink.send_line(self.secret.expose()).await?;
                    self.sends += 1;
                    self.verdict_from = reply_start;
                    self.advance(LoopState::PassphraseSent);
                    continue;
                }
                Action::Finish(state) => {
                    if self.state != state {
                        self.advance(state);
                    }
                    return Ok(state);
                }
                Action::Wait => {}
            }

            if snapshot.closed {
                tracing::debug!(state = ?self.state, "output closed without verdict");
                return Err(PassError::stream_closed(self.secret.redact(&snapshot.text)));
            }

            if snapshot.len != last_len {
                last_len = snapshot.len;
                last_change = Instant::now();
            } else if let Some(limit) = self.stall_timeout {
                if last_change.elapsed() >= limit {
                    tracing::debug!(state = ?self.state, ?limit, "output stalled");
                    return Err(PassError::stalled(
                        limit,
                        self.secret.redact(&snapshot.text),
                    ));
                }
            }

            tokio::select! {
                biased;
                () = &mut cancel => {
                    tracing::debug!(state = ?self.state, "interaction cancelled");
                    return Err(PassError::Cancelled);
                }
                _ = output.wait_for_change(self.poll_interval) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;

    use super::*;
    use crate::buffer::OutputWriter;

    #[derive(Default)]
    struct RecordingSink {
        lines: Vec<String>,
        fail: bool,
    }

    impl LineSink for RecordingSink {
        async fn send_line(&mut self, line: &str) -> Result<()> {
            if self.fail {
                return Err(PassError::Write(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "closed",
                )));
            }
            self.lines.push(line.to_string());
            Ok(())
        }
    }

    fn feed(writer: &mut OutputWriter, text: &str) {
        writer.append(text.as_bytes());
    }

    #[tokio::test]
    async fn success_path() {
        let markers = MarkerSet::default();
        let secret = Secret::new("hunter2");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Enter passphrase for /k: ");

        let mut sink = RecordingSink::default();
        let mut interaction = InteractionLoop::new(&markers, &secret);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            feed(&mut writer, "\r\nIdentity added: /k (me@host)\r\n");
        };
        let (result, ()) = tokio::join!(interaction.run(&output, &mut sink, pending()), driver);

        assert_eq!(result.unwrap(), LoopState::Success);
        assert_eq!(sink.lines, vec!["hunter2".to_string()]);
        assert_eq!(interaction.sends(), 1);
    }

    #[tokio::test]
    async fn failure_path_does_not_resend_on_reprompt() {
        let markers = MarkerSet::default();
        let secret = Secret::new("wrong");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Enter passphrase for /k: ");

        let mut sink = RecordingSink::default();
        let mut interaction = InteractionLoop::new(&markers, &secret);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            feed(&mut writer, "\r\nBad passphrase, try again for /k: ");
        };
        let (result, ()) = tokio::join!(interaction.run(&output, &mut sink, pending()), driver);

        assert_eq!(result.unwrap(), LoopState::Failure);
        assert_eq!(sink.lines.len(), 1);
        assert_eq!(interaction.state(), LoopState::Failure);
    }

    #[tokio::test]
    async fn earliest_verdict_wins() {
        let markers = MarkerSet::default();
        let secret = Secret::new("s");
        let (output, mut writer) = OutputBuffer::pair();
        feed(
            &mut writer,
            "Enter passphrase for /k: \nBad passphrase\nIdentity added: /k\n",
        );

        let mut sink = RecordingSink::default();
        let result = InteractionLoop::new(&markers, &secret)
            .run(&output, &mut sink, pending())
            .await;
        assert_eq!(result.unwrap(), LoopState::Failure);
    }

    #[tokio::test]
    async fn verdict_before_prompt_is_ignored() {
        let markers = MarkerSet::default();
        let secret = Secret::new("s");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Identity added: /k\n");
        drop(writer);

        let mut sink = RecordingSink::default();
        let err = InteractionLoop::new(&markers, &secret)
            .run(&output, &mut sink, pending())
            .await
            .unwrap_err();
        assert!(err.is_no_terminal_signal());
        assert!(sink.lines.is_empty());
    }

    #[tokio::test]
    async fn earlier_key_result_is_not_the_reply() {
        let markers = MarkerSet::default();
        let secret = Secret::new("wrong");
        let (output, mut writer) = OutputBuffer::pair();
        feed(
            &mut writer,
            "Identity added: /a (me@host)\r\nEnter passphrase for /b: ",
        );

        let mut sink = RecordingSink::default();
        let mut interaction = InteractionLoop::new(&markers, &secret);

        let driver = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            feed(&mut writer, "\r\nBad passphrase, try again for /b: ");
        };
        let (result, ()) = tokio::join!(interaction.run(&output, &mut sink, pending()), driver);

        assert_eq!(result.unwrap(), LoopState::Failure);
        assert_eq!(interaction.sends(), 1);
    }

    #[tokio::test]
    async fn earlier_key_result_without_reply_is_not_a_verdict() {
        let markers = MarkerSet::default();
        let secret = Secret::new("wrong");
        let (output, mut writer) = OutputBuffer::pair();
        feed(
            &mut writer,
            "Identity added: /a (me@host)\r\nEnter passphrase for /b: ",
        );
        drop(writer);

        let mut sink = RecordingSink::default();
        let mut interaction = InteractionLoop::new(&markers, &secret);
        let err = interaction
            .run(&output, &mut sink, pending())
            .await
            .unwrap_err();

        assert!(err.is_no_terminal_signal());
        assert_eq!(interaction.state(), LoopState::PassphraseSent);
        assert_eq!(sink.lines.len(), 1);
    }

    #[tokio::test]
    async fn closed_without_prompt_sends_nothing() {
        let markers = MarkerSet::default();
        let secret = Secret::new("s");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Could not open a connection to your authentication agent.\n");
        drop(writer);

        let mut sink = RecordingSink::default();
        let err = InteractionLoop::new(&markers, &secret)
            .run(&output, &mut sink, pending())
            .await
            .unwrap_err();

        match err {
            PassError::NoTerminalSignal { reason, buffer } => {
                assert_eq!(reason, crate::error::NoSignalReason::StreamClosed);
                assert!(buffer.contains("authentication agent"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(sink.lines.is_empty());
    }

    #[tokio::test]
    async fn stall_after_send_redacts_echo() {
        let markers = MarkerSet::default();
        let secret = Secret::new("hunter2");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Enter passphrase for /k: hunter2\r\n");

        let mut sink = RecordingSink::default();
        let err = InteractionLoop::new(&markers, &secret)
            .poll_interval(Duration::from_millis(5))
            .stall_timeout(Some(Duration::from_millis(50)))
            .run(&output, &mut sink, pending())
            .await
            .unwrap_err();

        match err {
            PassError::NoTerminalSignal { reason, buffer } => {
                assert!(matches!(reason, crate::error::NoSignalReason::Stalled(_)));
                assert!(!buffer.contains("hunter2"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sink.lines.len(), 1);
        drop(writer);
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let markers = MarkerSet::default();
        let secret = Secret::new("s");
        let (output, _writer) = OutputBuffer::pair();

        let mut sink = RecordingSink::default();
        let started = Instant::now();
        let err = InteractionLoop::new(&markers, &secret)
            .stall_timeout(None)
            .run(
                &output,
                &mut sink,
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, PassError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn write_failure_propagates() {
        let markers = MarkerSet::default();
        let secret = Secret::new("s");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Enter passphrase for /k: ");

        let mut sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let mut interaction = InteractionLoop::new(&markers, &secret);
        let err = interaction
            .run(&output, &mut sink, pending())
            .await
            .unwrap_err();

        assert!(matches!(err, PassError::Write(_)));
        assert_eq!(interaction.state(), LoopState::AwaitingPrompt);
        assert_eq!(interaction.sends(), 0);
    }

    #[tokio::test]
    async fn pin_prompt_is_answered() {
        let markers = MarkerSet::default();
        let secret = Secret::new("1234");
        let (output, mut writer) = OutputBuffer::pair();
        feed(&mut writer, "Enter PIN for ED25519-SK key /k: ");
        feed(&mut writer, "\nIdentity added: /k\n");

        let mut sink = RecordingSink::default();
        let result = InteractionLoop::new(&markers, &secret)
            .run(&output, &mut sink, pending())
            .await;
        assert_eq!(result.unwrap(), LoopState::Success);
        assert_eq!(sink.lines, vec!["1234".to_string()]);
    }
}
