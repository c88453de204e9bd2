//! HTTP plumbing shared by the polling drivers.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::device::Result;

/// Per-request deadline for upstream sources
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn client() -> Result<Client> {
    Ok(Client::builder().timeout(HTTP_TIMEOUT).build()?)
}

/// Read at most `limit` bytes of the body; the rest is discarded.
pub(crate) async fn read_capped(mut response: Response, limit: usize) -> Result<Vec<u8>> {
    let mut body = Vec::with_capacity(limit.min(4096));
    while body.len() < limit {
        let Some(chunk) = response.chunk().await? else {
            break;
        };
        let take = chunk.len().min(limit - body.len());
        body.extend_from_slice(&chunk[..take]);
    }
    Ok(body)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::net::SocketAddr;

    /// Serve `app` on an ephemeral loopback port for the rest of the test.
    pub(crate) async fn serve(app: axum::Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// An address nothing is listening on
    pub(crate) fn closed_addr() -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }
}
