// src/status.rs
//! HTTP status endpoint exposing the latest GPS state as JSON

use crate::{
    error::Result,
    gps::{GpsState, SharedState},
};
use axum::{extract::State, response::Json, routing::get, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn create_app(state: SharedState) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .with_state(state)
}

async fn status_handler(State(state): State<SharedState>) -> Json<GpsState> {
    Json(state.snapshot())
}

/// Serve the status endpoint on `listener` until `shutdown` fires
pub async fn serve(
    listener: TcpListener,
    state: SharedState,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "status endpoint listening");
    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    info!("status endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";

    #[tokio::test]
    async fn test_handler_returns_snapshot() {
        let state = SharedState::new();
        state.ingest(GGA).unwrap();

        let Json(snapshot) = status_handler(State(state)).await;
        assert_eq!(snapshot.satellites, Some(8));
        assert_eq!(snapshot.raw_data, GGA);
    }

    #[tokio::test]
    async fn test_serves_json_until_shutdown() {
        let state = SharedState::new();
        state.ingest(GGA).unwrap();
        let shutdown = CancellationToken::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener, state, shutdown.clone()));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("application/json"));
        assert!(response.contains("\"altitude\":545.4"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
