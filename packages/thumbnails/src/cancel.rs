use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ThumbnailError;

/// Cancellation token plus optional deadline applied to each backend call.
///
/// Cloning shares the token, so cancelling one clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl Cancellation {
    /// Never cancels and never times out.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { token, timeout }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Run `fut`, racing it against the token and the timeout.
    ///
    /// The token is checked first, so an already cancelled call never starts.
    pub async fn guard<T, E, F>(&self, fut: F) -> Result<T, ThumbnailError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ThumbnailError>,
    {
        if self.token.is_cancelled() {
            return Err(ThumbnailError::Cancelled);
        }

        let run = async {
            match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result.map_err(Into::into),
                    Err(_) => Err(ThumbnailError::Timeout(limit)),
                },
                None => fut.await.map_err(Into::into),
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(ThumbnailError::Cancelled),
            result = run => result,
        }
    }
}
