use crate::{
    client::Client,
    config::Config,
    error::{Error, Result},
};
use std::future::Future;
use tracing::{debug, error};

/// An authenticated Xen Orchestra connection.
///
/// Obtain one with [`Session::open`] and release it with [`Session::close`],
/// or let [`Session::scope`] do both around a piece of work.
pub struct Session {
    client: Client,
}

impl Session {
    /// Connects and signs in. If signing in fails the transport is torn
    /// down before the error is returned.
    pub async fn open(config: Config) -> Result<Self> {
        let client = Client::connect(config)
            .await
            .map_err(|e| Error::Session(format!("failed to connect to Xen Orchestra: {}", e)))?;
        debug!("Connected to Xen Orchestra.");

        debug!("Logging in...");
        if let Err(e) = client.sign_in().await {
            error!("Failed to establish API session: {}", e);
            if let Err(close_error) = client.disconnect().await {
                debug!("Disconnect after failed sign-in also failed: {}", close_error);
            }
            return Err(Error::Session(format!("sign-in failed: {}", e)));
        }
        debug!("Logged in.");

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Disconnects. Failures are logged, never returned, so they cannot mask
    /// the outcome of the work done with the session.
    pub async fn close(self) {
        match self.client.disconnect().await {
            Ok(()) => debug!("Disconnected from Xen Orchestra."),
            Err(e) => error!("Error disconnecting from API: {}", e),
        }
    }

    /// Runs `work` with a signed-in client and always closes the session
    /// afterwards.
    pub async fn scope<F, Fut, T>(config: Config, work: F) -> Result<T>
    where
        F: FnOnce(Client) -> Fut,
        Fut: Future<Output = T>,
    {
        let session = Self::open(config).await?;
        let outcome = work(session.client.clone()).await;
        session.close().await;
        Ok(outcome)
    }
}
