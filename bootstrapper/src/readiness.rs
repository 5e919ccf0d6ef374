//! Bounded polling for eventually-true external conditions.
//!
//! Every wait in the bring-up sequence goes through [`poll_until`], which
//! reports an explicit [`PollOutcome`] instead of failing on exhaustion. The
//! caller decides what a timeout means: the socket wait turns it into a hard
//! error, the replay/tip waits deliberately proceed anyway.

use std::future::Future;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::check_site;
use crate::error::{BootstrapError, BootstrapResult};
use crate::node::TipSource;

/// Replay wait: one log-tail check every 10 seconds.
pub const REPLAY_MAX_ATTEMPTS: usize = 600;
pub const REPLAY_INTERVAL: Duration = Duration::from_secs(10);
/// Lines the node emits while it has not finished historical replay.
pub const REPLAY_IN_PROGRESS_PATTERN: &str = "Replayed block|Syncing to subscription target";
const REPLAY_TAIL_LINES: usize = 10;

/// Socket wait: the only bounded wait whose exhaustion is fatal.
pub const SOCKET_MAX_ATTEMPTS: usize = 10;
pub const SOCKET_INTERVAL: Duration = Duration::from_secs(5);

/// Tip stabilization: sample the tip slot twice, 30 seconds apart, and call
/// the chain caught-up once it advanced but by fewer than 100 slots.
pub const TIP_MAX_ATTEMPTS: usize = 600;
pub const TIP_SAMPLE_WINDOW: Duration = Duration::from_secs(30);
pub const TIP_RECHECK_DELAY: Duration = Duration::from_secs(5);
pub const TIP_SETTLED_MAX_DELTA: u64 = 100;

/// Result of a bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held at the given 1-based attempt.
    Converged { attempts: usize },
    /// Every attempt was used up without the condition holding.
    TimedOut,
}

/// Runs `probe` up to `max_attempts` times, sleeping `interval` between
/// attempts, returning as soon as it reports true. A probe error (a transient
/// tip-query or helper failure) counts as a failed attempt and keeps the poll
/// going toward the cap; only the caller decides whether exhaustion is fatal.
pub async fn poll_until<F, Fut>(max_attempts: usize, interval: Duration, mut probe: F) -> PollOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = BootstrapResult<bool>>,
{
    for attempt in 1..=max_attempts {
        match probe().await {
            Ok(true) => return PollOutcome::Converged { attempts: attempt },
            Ok(false) => {}
            Err(e) => debug!(attempt, error = %e, "probe attempt failed"),
        }
        if attempt < max_attempts {
            sleep(interval).await;
        }
    }
    PollOutcome::TimedOut
}

/// Window read from the end of the log; the relay log grows without bound
/// during bulk replay, so the whole file must never be loaded.
const TAIL_WINDOW_BYTES: u64 = 64 * 1024;

/// Last `n` lines of a file, read from a bounded window at the end. A missing
/// or unreadable file reads as empty, matching what tailing a not-yet-created
/// log does.
fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    let Ok(mut file) = std::fs::File::open(path) else {
        return Vec::new();
    };
    let Ok(len) = file.metadata().map(|m| m.len()) else {
        return Vec::new();
    };
    let start = len.saturating_sub(TAIL_WINDOW_BYTES);
    if file.seek(SeekFrom::Start(start)).is_err() {
        return Vec::new();
    }
    let mut buf = Vec::with_capacity((len - start) as usize);
    if file.read_to_end(&mut buf).is_err() {
        return Vec::new();
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.lines().collect();
    // a mid-file seek can land inside a line; its tail fragment is dropped
    if start > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(n);
    lines.into_iter().skip(skip).map(str::to_string).collect()
}

/// Blocks while the tail of the relay stdout log still shows replay or
/// subscription-target progress. Exhausting the cap is not an error.
pub async fn wait_for_replay_completion(relay_log: &Path) -> BootstrapResult<PollOutcome> {
    let pattern = Regex::new(REPLAY_IN_PROGRESS_PATTERN)
        .map_err(|e| BootstrapError::Other(anyhow::anyhow!(e)))?;
    let pattern = &pattern;
    info!(log = %relay_log.display(), "waiting for chain replay to finish");
    Ok(poll_until(REPLAY_MAX_ATTEMPTS, REPLAY_INTERVAL, move || async move {
        let tail = tail_lines(relay_log, REPLAY_TAIL_LINES);
        Ok(!tail.iter().any(|line| pattern.is_match(line)))
    })
    .await)
}

/// Waits for the node control socket to exist. Unlike the other waits this
/// one is a hard gate: without the socket nothing downstream can query the
/// node.
pub async fn wait_for_socket(socket_path: &Path) -> BootstrapResult<()> {
    info!(socket = %socket_path.display(), "waiting for node socket");
    match poll_until(SOCKET_MAX_ATTEMPTS, SOCKET_INTERVAL, move || async move {
        Ok(socket_path.exists())
    })
    .await
    {
        PollOutcome::Converged { attempts } => {
            debug!(attempts, "node socket is up");
            Ok(())
        }
        PollOutcome::TimedOut => Err(BootstrapError::SocketNeverAppeared {
            path: socket_path.to_path_buf(),
            attempts: SOCKET_MAX_ATTEMPTS,
            site: check_site!(),
        }),
    }
}

/// Waits until the tip slot advances by more than zero but fewer than
/// [`TIP_SETTLED_MAX_DELTA`] slots over a 30-second window, i.e. the node has
/// dropped from bulk catch-up to real-time block production.
///
/// A tip that never advances at all keeps the loop running until the cap and
/// then falls through as [`PollOutcome::TimedOut`]; the caller proceeds
/// regardless, so a stuck chain is not distinguished from a settled one here.
pub async fn wait_for_tip_stabilization(tip: &dyn TipSource) -> PollOutcome {
    info!("waiting for chain tip to stop advancing at bulk speed");
    poll_until(TIP_MAX_ATTEMPTS, TIP_RECHECK_DELAY, move || async move {
        let first = tip.query_tip().await?.slot;
        sleep(TIP_SAMPLE_WINDOW).await;
        let second = tip.query_tip().await?.slot;
        let delta = second.saturating_sub(first);
        debug!(first, second, delta, "tip sample window");
        Ok(delta > 0 && delta < TIP_SETTLED_MAX_DELTA)
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use rstest::rstest;

    use super::*;
    use crate::node::tests::ScriptedTip;
    use crate::node::ChainTip;

    #[tokio::test(start_paused = true)]
    async fn poll_converges_on_third_attempt() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let outcome = poll_until(10, Duration::from_secs(5), move || async move {
            Ok(calls.fetch_add(1, Ordering::SeqCst) + 1 == 3)
        })
        .await;
        assert_eq!(outcome, PollOutcome::Converged { attempts: 3 });
        // no further probes after convergence
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_after_max_attempts() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let outcome = poll_until(4, Duration::from_secs(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        })
        .await;
        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_survives_transient_probe_errors() {
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let outcome = poll_until(5, Duration::from_secs(1), move || async move {
            match calls.fetch_add(1, Ordering::SeqCst) + 1 {
                1 | 2 => Err(BootstrapError::TipQuery("connection refused".into())),
                n => Ok(n == 3),
            }
        })
        .await;
        assert_eq!(outcome, PollOutcome::Converged { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_when_every_probe_errors() {
        let outcome = poll_until(5, Duration::from_secs(1), || async {
            Err(BootstrapError::TipQuery("boom".into()))
        })
        .await;
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn socket_wait_succeeds_when_socket_exists() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("node.socket");
        std::fs::File::create(&socket).unwrap();
        wait_for_socket(&socket).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn socket_wait_picks_up_socket_appearing_mid_poll() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("node.socket");
        let creator = {
            let socket = socket.clone();
            tokio::spawn(async move {
                // lands between the third and fourth attempt boundary
                sleep(Duration::from_secs(12)).await;
                std::fs::File::create(&socket).unwrap();
            })
        };
        wait_for_socket(&socket).await.unwrap();
        creator.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn socket_wait_fails_after_ten_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("node.socket");
        let err = wait_for_socket(&socket).await.unwrap_err();
        assert_matches!(
            err,
            BootstrapError::SocketNeverAppeared { attempts: 10, .. }
        );
    }

    #[rstest]
    #[case::fast_then_settled(vec![0, 500, 520, 570], 2)]
    #[case::settled_immediately(vec![1000, 1050], 1)]
    #[tokio::test(start_paused = true)]
    async fn tip_wait_terminates_once_delta_drops_below_threshold(
        #[case] slots: Vec<u64>,
        #[case] expected_attempts: usize,
    ) {
        let tip = ScriptedTip::with_slots(slots);
        let outcome = wait_for_tip_stabilization(&tip).await;
        assert_eq!(
            outcome,
            PollOutcome::Converged {
                attempts: expected_attempts
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tip_wait_survives_a_transient_query_error() {
        struct FlakyTip {
            calls: AtomicUsize,
        }

        #[async_trait::async_trait]
        impl TipSource for FlakyTip {
            async fn query_tip(&self) -> BootstrapResult<ChainTip> {
                match self.calls.fetch_add(1, Ordering::SeqCst) + 1 {
                    // first sample window dies mid-query
                    1 => Err(BootstrapError::TipQuery("socket hiccup".into())),
                    n => Ok(ChainTip { slot: 100 + n as u64 * 25, block: 0 }),
                }
            }
        }

        let tip = FlakyTip { calls: AtomicUsize::new(0) };
        // second iteration samples 150 then 175, delta 25: settled
        let outcome = wait_for_tip_stabilization(&tip).await;
        assert_eq!(outcome, PollOutcome::Converged { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn tip_wait_continues_while_delta_is_zero() {
        // stalled tip: delta stays 0, the loop must not converge
        let tip = ScriptedTip::with_slots(vec![42]);
        let tip: &dyn TipSource = &tip;
        let outcome = poll_until(3, TIP_RECHECK_DELAY, move || async move {
            let first = tip.query_tip().await?.slot;
            sleep(TIP_SAMPLE_WINDOW).await;
            let second = tip.query_tip().await?.slot;
            let delta = second.saturating_sub(first);
            Ok(delta > 0 && delta < TIP_SETTLED_MAX_DELTA)
        })
        .await;
        assert_eq!(outcome, PollOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn replay_wait_blocks_on_progress_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("relay1.stdout");
        let mut f = std::fs::File::create(&log).unwrap();
        for i in 0..20 {
            writeln!(f, "Replayed block: slot {i}").unwrap();
        }
        drop(f);

        let pattern = Regex::new(REPLAY_IN_PROGRESS_PATTERN).unwrap();
        assert!(tail_lines(&log, 10).iter().any(|l| pattern.is_match(l)));

        // once the tail rolls past the replay lines the wait converges
        let mut f = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
        for i in 0..10 {
            writeln!(f, "Chain extended, new tip: {i}").unwrap();
        }
        drop(f);
        let outcome = wait_for_replay_completion(&log).await.unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn tail_reads_only_the_end_of_a_large_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("relay1.stdout");
        let mut f = std::fs::File::create(&log).unwrap();
        // well past the tail window
        for i in 0..20_000 {
            writeln!(f, "Replayed block: slot {i:070}").unwrap();
        }
        for i in 0..10 {
            writeln!(f, "Chain extended, new tip: {i}").unwrap();
        }
        drop(f);
        assert!(std::fs::metadata(&log).unwrap().len() > TAIL_WINDOW_BYTES);

        let tail = tail_lines(&log, 10);
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0], "Chain extended, new tip: 0");
        assert_eq!(tail[9], "Chain extended, new tip: 9");

        let outcome = wait_for_replay_completion(&log).await.unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn replay_wait_treats_missing_log_as_done() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = wait_for_replay_completion(&dir.path().join("absent.log")).await.unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 1 });
    }
}
