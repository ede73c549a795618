//! Console-side agent connection

use crate::codec::JsonCodec;
use crate::messages::{AgentRequest, AgentResponse, AgentStatus};
use crate::ProtoError;
use ctxmesh_common::Envelope;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

/// One request is in flight at a time; each is answered by exactly one frame
pub struct AgentClient<S = TcpStream> {
    framed: Framed<S, JsonCodec<AgentResponse, AgentRequest>>,
}

impl AgentClient<TcpStream> {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ProtoError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl<S> AgentClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, JsonCodec::new()),
        }
    }

    async fn request(&mut self, request: AgentRequest) -> Result<AgentResponse, ProtoError> {
        self.framed.send(request).await?;
        match self.framed.next().await {
            Some(Ok(AgentResponse::Error { message })) => Err(ProtoError::Agent(message)),
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(e),
            None => Err(ProtoError::ConnectionClosed),
        }
    }

    /// Run one command line on the agent's cluster
    pub async fn execute(&mut self, line: &str) -> Result<Envelope, ProtoError> {
        let request = AgentRequest::Command {
            line: line.to_string(),
        };
        match self.request(request).await? {
            AgentResponse::Envelope { envelope } => Ok(envelope),
            other => Err(ProtoError::UnexpectedResponse {
                expected: "envelope",
                got: other.kind(),
            }),
        }
    }

    pub async fn status(&mut self) -> Result<AgentStatus, ProtoError> {
        match self.request(AgentRequest::Status).await? {
            AgentResponse::Status(status) => Ok(status),
            other => Err(ProtoError::UnexpectedResponse {
                expected: "status",
                got: other.kind(),
            }),
        }
    }

    pub async fn metrics(&mut self) -> Result<String, ProtoError> {
        match self.request(AgentRequest::Metrics).await? {
            AgentResponse::Metrics { text } => Ok(text),
            other => Err(ProtoError::UnexpectedResponse {
                expected: "metrics",
                got: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmesh_common::{ErrorKind, Reply, ServerId};

    /// Answers each request on the far end of a duplex pipe
    async fn fake_agent<F>(io: tokio::io::DuplexStream, answer: F)
    where
        F: Fn(AgentRequest) -> AgentResponse,
    {
        let mut framed = Framed::new(io, JsonCodec::<AgentRequest, AgentResponse>::new());
        while let Some(Ok(request)) = framed.next().await {
            if framed.send(answer(request)).await.is_err() {
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_execute_returns_envelope() {
        let (client_io, agent_io) = tokio::io::duplex(4096);
        tokio::spawn(fake_agent(agent_io, |request| match request {
            AgentRequest::Command { line } if line == "failNode 1" => AgentResponse::Envelope {
                envelope: Envelope::success(Reply::Node {
                    node: ServerId(1),
                    alive: false,
                }),
            },
            _ => AgentResponse::Envelope {
                envelope: Envelope::failure(ErrorKind::UnknownCommand, "nope"),
            },
        }));

        let mut client = AgentClient::new(client_io);
        assert!(client.execute("failNode 1").await.unwrap().ok);
        assert_eq!(
            client.execute("bogus").await.unwrap().error_kind(),
            Some(ErrorKind::UnknownCommand)
        );
    }

    #[tokio::test]
    async fn test_agent_error_and_mismatch() {
        let (client_io, agent_io) = tokio::io::duplex(4096);
        tokio::spawn(fake_agent(agent_io, |request| match request {
            AgentRequest::Metrics => AgentResponse::Error {
                message: "metrics disabled".to_string(),
            },
            _ => AgentResponse::Metrics {
                text: String::new(),
            },
        }));

        let mut client = AgentClient::new(client_io);
        assert!(matches!(
            client.metrics().await,
            Err(ProtoError::Agent(msg)) if msg == "metrics disabled"
        ));
        assert!(matches!(
            client.status().await,
            Err(ProtoError::UnexpectedResponse {
                expected: "status",
                got: "metrics"
            })
        ));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let (client_io, agent_io) = tokio::io::duplex(4096);
        drop(agent_io);

        let mut client = AgentClient::new(client_io);
        assert!(client.status().await.is_err());
    }
}
