//! Shared helpers: spin up the mock REDCap server on a random port and
//! point a client at it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use mock_server::MockProject;
use redcap_core::{RedcapClient, RedcapSpec, Transport, TransportConfig};

pub const TOKEN: &str = "ABC123";

pub async fn spawn(config: MockProject) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        mock_server::run(listener, config).await.unwrap();
    });
    addr
}

pub fn spec_for(addr: SocketAddr, token: &str, username: &str) -> RedcapSpec {
    RedcapSpec::new(format!("http://{addr}/"), token, username).unwrap()
}

pub fn client_for(addr: SocketAddr, token: &str, username: &str) -> RedcapClient {
    RedcapClient::new(spec_for(addr, token, username)).unwrap()
}

pub fn client_with_deadline(
    addr: SocketAddr,
    token: &str,
    username: &str,
    deadline: Duration,
) -> RedcapClient {
    let transport = Transport::new(TransportConfig {
        connect_timeout: Duration::from_secs(5),
        deadline: Some(deadline),
    })
    .unwrap();
    RedcapClient::with_transport(spec_for(addr, token, username), transport)
}
