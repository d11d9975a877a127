//! Neighbor calls over HTTP/JSON, mirroring the routes in `routes.rs`.

use powchain_core::{
    Block, ChainResponse, HealthResponse, PeerError, PeerEvent, PeerTransport,
    TransactionRequest,
};
use reqwest::{Client, Response};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

fn url(peer: SocketAddr, path: &str) -> String {
    format!("http://{peer}{path}")
}

fn check(peer: SocketAddr, sent: reqwest::Result<Response>) -> Result<Response, PeerError> {
    let resp = sent.map_err(|e| PeerError::Unreachable(peer.to_string(), e.to_string()))?;
    if !resp.status().is_success() {
        return Err(PeerError::Status(peer.to_string(), resp.status().as_u16()));
    }
    Ok(resp)
}

impl PeerTransport for HttpTransport {
    async fn node_id(&self, peer: SocketAddr) -> Result<String, PeerError> {
        let resp = check(peer, self.client.get(url(peer, "/health")).send().await)?;
        let body: HealthResponse = resp
            .json()
            .await
            .map_err(|e| PeerError::Decode(peer.to_string(), e.to_string()))?;
        Ok(body.node_id)
    }

    async fn fetch_chain(&self, peer: SocketAddr) -> Result<Vec<Block>, PeerError> {
        let resp = check(peer, self.client.get(url(peer, "/chain")).send().await)?;
        let body: ChainResponse = resp
            .json()
            .await
            .map_err(|e| PeerError::Decode(peer.to_string(), e.to_string()))?;
        Ok(body.chain)
    }

    async fn notify(&self, peer: SocketAddr, event: PeerEvent) -> Result<(), PeerError> {
        let request = match event {
            PeerEvent::ClearPool => self.client.delete(url(peer, "/transactions")),
            PeerEvent::NewBlock => self.client.put(url(peer, "/consensus")),
        };
        check(peer, request.send().await)?;
        Ok(())
    }

    async fn relay_transaction(
        &self,
        peer: SocketAddr,
        request: &TransactionRequest,
    ) -> Result<(), PeerError> {
        let sent = self
            .client
            .put(url(peer, "/transactions"))
            .json(request)
            .send()
            .await;
        check(peer, sent)?;
        Ok(())
    }
}
