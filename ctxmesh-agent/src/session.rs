//! One console connection

use crate::server::AgentState;
use ctxmesh_proto::{AgentRequest, AgentResponse, JsonCodec, ProtoError};
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Serve requests in order until the console disconnects or the agent shuts
/// down. A request in progress always completes.
pub async fn run_session(
    stream: TcpStream,
    id: u64,
    state: Arc<AgentState>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, JsonCodec::<AgentRequest, AgentResponse>::new());

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = framed.next() => frame,
        };

        let response = match request {
            None => break,
            Some(Ok(request)) => state.handle(request).await,
            // The frame was consumed, but the stream ends after a decode error
            Some(Err(ProtoError::Json(e))) => {
                warn!("Session {} sent an undecodable request: {}", id, e);
                let _ = framed
                    .send(AgentResponse::Error {
                        message: format!("invalid request: {}", e),
                    })
                    .await;
                break;
            }
            Some(Err(e)) => {
                debug!("Session {} read failed: {}", id, e);
                break;
            }
        };

        if let Err(e) = framed.send(response).await {
            debug!("Session {} write failed: {}", id, e);
            break;
        }
    }

    state.close_session(id);
}
