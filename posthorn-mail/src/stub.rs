//! Non-delivering transport.
//!
//! The stub composes the full message exactly as a real transport would and
//! hands the raw bytes back in [`SentMail::message`], but never delivers it.
//! Every send is recorded so tests and development tooling can inspect what
//! would have gone out.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

use crate::message::{SentMail, compose};
use crate::{MailOptions, Result, Transport};

/// Transport that records messages instead of sending them.
#[derive(Default)]
pub struct StubTransport {
    sent: Mutex<Vec<SentMail>>,
    closes: AtomicUsize,
}

impl StubTransport {
    /// Create a new stub transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every message recorded so far, oldest first.
    pub fn messages(&self) -> Vec<SentMail> {
        self.sent.lock().clone()
    }

    /// The most recently recorded message.
    pub fn last(&self) -> Option<SentMail> {
        self.sent.lock().last().cloned()
    }

    /// Number of recorded messages.
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Forget all recorded messages.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Number of times `close` was called.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send_mail(&self, options: &MailOptions) -> Result<SentMail> {
        let composed = compose(options)?;
        let sent = SentMail {
            envelope: composed.envelope(),
            message: Some(composed.message.formatted()),
            message_id: Some(composed.message_id),
            response: None,
        };

        debug!(to = ?sent.envelope.to, "Stub transport recorded email");
        self.sent.lock().push(sent.clone());
        Ok(sent)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
