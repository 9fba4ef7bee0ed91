//! Synchronous dispatch of messages to a loaded extension

use std::sync::Arc;

use bndl_errors::{Error, Result};

use crate::records::{MessageArgs, MessageResults};
use crate::version::ApiVersion;

/// An in-process extension observing and steering the engine.
///
/// `on_message` runs on the engine's thread while the engine waits, so
/// implementations should return promptly. Returning an error does not
/// tear down the session: the dispatcher converts it to a veto for
/// cancelable messages and logs and ignores it for informational ones.
pub trait Extension: Send + Sync {
    /// Protocol version the extension was built against.
    fn api_version(&self) -> ApiVersion;

    /// Handle one message, optionally writing results back.
    ///
    /// # Errors
    ///
    /// Any error; see the trait docs for how the dispatcher reacts.
    fn on_message(&self, args: &MessageArgs, results: &mut MessageResults) -> Result<()>;
}

/// Routes messages to one extension under a negotiated [`ApiVersion`]
pub struct Dispatcher {
    extension: Arc<dyn Extension>,
    version: ApiVersion,
}

impl Dispatcher {
    /// Attach an extension, negotiating the protocol version.
    ///
    /// # Errors
    ///
    /// Fails with a major version mismatch when the extension targets a
    /// different major protocol line.
    pub fn create(extension: Arc<dyn Extension>) -> Result<Self> {
        let version = ApiVersion::negotiate(ApiVersion::CURRENT, extension.api_version())?;
        tracing::debug!(%version, "extension attached");
        Ok(Self { extension, version })
    }

    #[must_use]
    pub fn version(&self) -> ApiVersion {
        self.version
    }

    /// Deliver one message and collect the extension's results.
    ///
    /// Arguments and results are both clamped to the negotiated
    /// version. An extension error on a cancelable message becomes a
    /// veto; on an informational message it is logged and any partial
    /// writes to the results are discarded.
    #[must_use]
    pub fn dispatch(&self, mut args: MessageArgs) -> MessageResults {
        let message = args.message();
        args.clamp_to(self.version);
        let mut results = MessageResults::for_message(message);
        match self.extension.on_message(&args, &mut results) {
            Ok(()) => {}
            Err(error) if message.cancelable() => {
                tracing::debug!(%message, %error, "extension error treated as veto");
                results = MessageResults::for_message(message);
                results.veto();
            }
            Err(error) => {
                tracing::warn!(%message, %error, "extension error on informational message ignored");
                results = MessageResults::for_message(message);
            }
        }
        results.clamp_to(self.version);
        results
    }

    /// Like [`dispatch`](Self::dispatch), but a cancel request comes
    /// back as [`Error::Cancelled`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` when the extension cancels.
    pub fn dispatch_checked(&self, args: MessageArgs) -> Result<MessageResults> {
        let results = self.dispatch(args);
        if results.cancel_requested() {
            return Err(Error::Cancelled);
        }
        Ok(results)
    }

    /// Deliver an informational message, discarding the results record.
    ///
    /// Informational results carry nothing the engine reads back, so
    /// announcement sites use this instead of ignoring a
    /// [`dispatch`](Self::dispatch) return.
    pub fn announce(&self, args: MessageArgs) {
        let _ = self.dispatch(args);
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// No-op extension for running the engine without one attached
#[derive(Debug, Clone, Copy, Default)]
pub struct NullExtension;

impl Extension for NullExtension {
    fn api_version(&self) -> ApiVersion {
        ApiVersion::CURRENT
    }

    fn on_message(&self, _args: &MessageArgs, _results: &mut MessageResults) -> Result<()> {
        Ok(())
    }
}
