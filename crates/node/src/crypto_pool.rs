//! Shared worker pool for signature verification.
//!
//! Vote verification is the only CPU-bound work the node delegates; module
//! loops stay responsive while batches of ed25519 checks run on a small set
//! of dedicated threads. Results come back as events on the consensus
//! queue.

use monsoon_core::{Event, HotstuffMessage};
use monsoon_types::PublicKey;
use std::sync::mpsc;
use std::thread;
use tracing::debug;

/// One verification request.
struct VerifyJob {
    message: HotstuffMessage,
    public_key: PublicKey,
    signing_message: Vec<u8>,
    reply: tokio::sync::mpsc::Sender<Event>,
}

/// Handle to the verification pool. Cloning shares the same workers;
/// dropping the last handle shuts them down.
#[derive(Clone)]
pub struct CryptoPool {
    jobs: mpsc::Sender<VerifyJob>,
}

impl CryptoPool {
    /// Spawn `workers` verification threads.
    pub fn new(workers: usize) -> Self {
        let (jobs, rx) = mpsc::channel::<VerifyJob>();
        let rx = std::sync::Arc::new(std::sync::Mutex::new(rx));
        for worker in 0..workers.max(1) {
            let rx = rx.clone();
            thread::Builder::new()
                .name(format!("crypto-{worker}"))
                .spawn(move || loop {
                    let job = {
                        let guard = match rx.lock() {
                            Ok(guard) => guard,
                            Err(_) => return,
                        };
                        guard.recv()
                    };
                    let Ok(job) = job else {
                        debug!(worker, "crypto worker stopping");
                        return;
                    };
                    let valid = job
                        .message
                        .partial_sig
                        .as_ref()
                        .map(|partial| {
                            job.public_key
                                .verify(&job.signing_message, &partial.signature)
                                .is_ok()
                        })
                        .unwrap_or(false);
                    let event = Event::VoteVerified {
                        message: job.message,
                        valid,
                    };
                    // Receiver gone means the node is shutting down.
                    let _ = job.reply.blocking_send(event);
                })
                .expect("failed to spawn crypto worker thread");
        }
        CryptoPool { jobs }
    }

    /// Queue a vote for verification; the result arrives as
    /// [`Event::VoteVerified`] on `reply`.
    pub fn verify_vote(
        &self,
        message: HotstuffMessage,
        public_key: PublicKey,
        signing_message: Vec<u8>,
        reply: tokio::sync::mpsc::Sender<Event>,
    ) {
        let _ = self.jobs.send(VerifyJob {
            message,
            public_key,
            signing_message,
            reply,
        });
    }
}
