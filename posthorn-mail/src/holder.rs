//! Shared transport state and runtime reload.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

use crate::{MailConfig, MailOptions, Result, Transport, TransportFactory, TransportKind};

struct Active {
    transport: Arc<dyn Transport>,
    defaults: MailOptions,
}

/// Holds the live real transport, the stub transport and the defaults.
///
/// Clones share one state cell: a reload through any clone is seen by every
/// capability built from any other clone, including sends already in flight
/// that have not yet reached their transport submission step.
#[derive(Clone)]
pub struct TransportHolder {
    active: Arc<RwLock<Active>>,
    stub: Arc<dyn Transport>,
    factory: Arc<dyn TransportFactory>,
}

impl TransportHolder {
    /// Build the stub transport and then the real transport from `config`.
    ///
    /// Defaults start as `{ generateTextFromHTML: true }` with the caller's
    /// `defaults` merged on top, so caller values win here.
    pub fn new(config: &MailConfig, factory: Arc<dyn TransportFactory>) -> Result<Self> {
        let stub = factory.create(&TransportKind::Stub, &config.config)?;
        let transport = factory.create(&config.transport, &config.config)?;

        let mut defaults = MailOptions::base_defaults();
        defaults.merge(config.defaults.as_ref());

        info!(transport = %config.transport, "Mail transports initialized");

        Ok(Self {
            active: Arc::new(RwLock::new(Active {
                transport,
                defaults,
            })),
            stub,
            factory,
        })
    }

    /// The current real transport.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.active.read().transport.clone()
    }

    /// The stub transport. Never replaced by a reload.
    pub fn stub(&self) -> Arc<dyn Transport> {
        self.stub.clone()
    }

    /// A copy of the current defaults.
    pub fn defaults(&self) -> MailOptions {
        self.active.read().defaults.clone()
    }

    /// Replace the real transport and the defaults.
    ///
    /// The current transport is closed first. If closing fails the error is
    /// returned and nothing is replaced. On success the defaults become a
    /// fresh copy of `config.defaults` (the previous defaults, including the
    /// built-in `generateTextFromHTML`, are discarded) and a new transport is
    /// built from `config.transport` and `config.config`.
    ///
    /// Reloads are not serialised against each other: two overlapping
    /// reloads both close whatever transport they observed and the one that
    /// finishes last installs its transport.
    pub async fn reload(&self, config: &MailConfig) -> Result<()> {
        let current = self.transport();

        if let Err(err) = current.close().await {
            debug!(error = %err, "Transport close failed, keeping current transport");
            return Err(err);
        }

        let mut defaults = MailOptions::new();
        defaults.merge(config.defaults.as_ref());
        let transport = self.factory.create(&config.transport, &config.config)?;

        {
            let mut active = self.active.write();
            active.defaults = defaults;
            active.transport = transport;
        }

        info!(transport = %config.transport, "Mail transport reloaded");
        Ok(())
    }

    /// Whether two holders share the same state cell.
    pub fn same_state(&self, other: &TransportHolder) -> bool {
        Arc::ptr_eq(&self.active, &other.active)
    }
}
