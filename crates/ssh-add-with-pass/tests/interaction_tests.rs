//! Property tests for the interaction loop over arbitrary output chunkings.

use std::future::pending;
use std::time::Duration;

use proptest::prelude::*;
use ssh_add_with_pass::{
    InteractionLoop, LineSink, LoopState, MarkerSet, OutputBuffer, PassError, Result, Secret,
};

#[derive(Default)]
struct RecordingSink {
    lines: Vec<String>,
}

impl LineSink for RecordingSink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// Noise that never contains a marker.
fn noise() -> impl Strategy<Value = String> {
    "[a-z0-9 .:/\r\n]{0,40}"
}

/// Split `text` at the given byte offsets, keeping UTF-8 intact.
fn chunk(text: &str, cuts: &[usize]) -> Vec<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.push(0);
    points.push(bytes.len());
    points.sort_unstable();
    points.dedup();
    points
        .windows(2)
        .map(|w| bytes[w[0]..w[1]].to_vec())
        .collect()
}

/// Feed `chunks` into a fresh buffer while the loop runs, then close it.
fn run_loop(chunks: Vec<Vec<u8>>) -> (std::result::Result<LoopState, PassError>, usize) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(async move {
        let markers = MarkerSet::default();
        let secret = Secret::new("s3cret");
        let (output, mut writer) = OutputBuffer::pair();
        let mut sink = RecordingSink::default();

        let feeder = async move {
            for piece in chunks {
                writer.append(&piece);
                tokio::task::yield_now().await;
            }
            drop(writer);
        };

        let mut interaction = InteractionLoop::new(&markers, &secret)
            .poll_interval(Duration::from_millis(1))
            .stall_timeout(None);
        let (result, ()) = tokio::join!(interaction.run(&output, &mut sink, pending()), feeder);
        (result, sink.lines.len())
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn secret_is_sent_at_most_once(
        pre in noise(),
        between in noise(),
        verdict in prop::sample::select(vec!["Identity added", "Bad passphrase"]),
        reprompts in 0usize..4,
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut text = format!("{pre}Enter passphrase for /k: {between}");
        for _ in 0..reprompts {
            text.push_str("Enter passphrase for /k: ");
        }
        text.push_str(verdict);

        let (result, sends) = run_loop(chunk(&text, &cuts));
        prop_assert_eq!(sends, 1);
        prop_assert!(result.is_ok());
    }

    #[test]
    fn failure_is_never_overturned(
        between in noise(),
        after in noise(),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let text = format!(
            "Enter passphrase for /k: {between}Bad passphrase, try again: {after}Identity added: /k\n"
        );

        let (result, sends) = run_loop(chunk(&text, &cuts));
        prop_assert_eq!(result.unwrap(), LoopState::Failure);
        prop_assert_eq!(sends, 1);
    }

    #[test]
    fn output_without_prompt_never_sends(
        text in noise(),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let (result, sends) = run_loop(chunk(&text, &cuts));
        prop_assert_eq!(sends, 0);
        prop_assert!(
            result.as_ref().is_err_and(PassError::is_no_terminal_signal),
            "expected no terminal signal, got {:?}",
            result
        );
    }

    #[test]
    fn verdict_before_prompt_is_not_the_reply(
        earlier in prop::sample::select(vec!["Identity added: /a\r\n", "Bad passphrase\r\n"]),
        reply in prop::option::of(prop::sample::select(vec![
            ("Identity added: /k\n", LoopState::Success),
            ("Bad passphrase, try again for /k: ", LoopState::Failure),
        ])),
        between in noise(),
        cuts in prop::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut text = format!("{earlier}{between}Enter passphrase for /k: ");
        if let Some((line, _)) = reply {
            text.push_str(line);
        }

        let (result, sends) = run_loop(chunk(&text, &cuts));
        prop_assert_eq!(sends, 1);
        match reply {
            Some((_, expected)) => prop_assert_eq!(result.unwrap(), expected),
            None => prop_assert!(
                result.as_ref().is_err_and(PassError::is_no_terminal_signal),
                "expected no terminal signal, got {:?}",
                result
            ),
        }
    }
}
