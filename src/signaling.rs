//! Request/response exchanges with the signaling server.
//!
//! Three calls, each attempted exactly once:
//! - `POST /channels` opens a session and returns the remote offer
//! - `POST /channels/{id}/answer` submits the local answer and candidates
//! - `POST /channels/{id}/close` tears the session down
//!
//! The channel id is opaque and always sent as one escaped path segment.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result, UserError};
use crate::peer::types::{AnswerBundle, Candidate, ChannelData, SessionDescription};
use crate::session::Session;
use crate::utils::add_http_scheme;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Acknowledgement body returned by the server
#[derive(Debug, Clone, PartialEq)]
pub struct Ack(pub serde_json::Value);

#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Opens a session; the result carries the remote offer and candidates.
    async fn open_session(&self) -> Result<Session>;

    /// Submits the local answer with the frozen candidate set.
    async fn submit_answer(
        &self,
        session: &Session,
        answer: &SessionDescription,
        candidates: &[Candidate],
    ) -> Result<Ack>;

    async fn close_session(&self, session: &Session) -> Result<Ack>;

    /// Teardown that tolerates a missing session: no network call is made and
    /// the caller gets a user error instead.
    async fn close(&self, session: Option<&Session>) -> Result<Ack> {
        match session {
            Some(session) => self.close_session(session).await,
            None => Err(UserError::NoSession.into()),
        }
    }
}

/// Signaling over plain HTTP with JSON bodies
pub struct HttpSignaling {
    base: Url,
    http: reqwest::Client,
}

impl HttpSignaling {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let address = add_http_scheme(&config.address);
        let base = Url::parse(&address).map_err(|e| {
            UserError::InvalidConfig(format!("bad signaling address {address}: {e}"))
        })?;
        if base.cannot_be_a_base() {
            return Err(
                UserError::InvalidConfig(format!("signaling address {address} has no path")).into(),
            );
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { base, http })
    }

    /// Appends `segments` to the base url, escaping each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn post<B, T>(&self, segments: &[&str], body: Option<&B>) -> Result<T>
    where
        B: serde::Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(segments);
        debug!(%url, "signaling request");

        let mut request = self.http.post(url).header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            let message = String::from_utf8_lossy(&bytes).trim().to_string();
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                } else {
                    message
                },
            });
        }

        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map_err(|e| ClientError::Server {
            status: status.as_u16(),
            message: format!("unexpected response body from /{}: {e}", segments.join("/")),
        })
    }
}

#[async_trait]
impl SignalingChannel for HttpSignaling {
    async fn open_session(&self) -> Result<Session> {
        let data: ChannelData = self.post::<(), _>(&["channels"], None).await?;
        info!(
            channel = %data.channel_id,
            remote_candidates = data.ice_candidates.len(),
            "channel opened"
        );
        Ok(Session::from(data))
    }

    async fn submit_answer(
        &self,
        session: &Session,
        answer: &SessionDescription,
        candidates: &[Candidate],
    ) -> Result<Ack> {
        let bundle = AnswerBundle {
            answer: answer.clone(),
            ice_candidates: candidates.to_vec(),
        };
        let ack = self
            .post(&["channels", session.id.as_str(), "answer"], Some(&bundle))
            .await?;
        info!(channel = %session.id, candidates = candidates.len(), "answer submitted");
        Ok(Ack(ack))
    }

    async fn close_session(&self, session: &Session) -> Result<Ack> {
        let ack = self
            .post::<(), _>(&["channels", session.id.as_str(), "close"], None)
            .await?;
        info!(channel = %session.id, "channel closed");
        Ok(Ack(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::peer::types::SdpType;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        answers: Mutex<Vec<(String, Value)>>,
        closes: Mutex<Vec<String>>,
    }

    async fn open_channel() -> Json<Value> {
        Json(json!({
            "channel_id": "c1",
            "offer": {"type": "offer", "sdp": "v=0\r\n"},
            "ice_candidates": [
                {"candidate": "candidate:1 1 udp 2130706431 10.0.0.1 5000 typ host", "sdpMid": "0", "sdpMLineIndex": 0}
            ]
        }))
    }

    async fn answer(
        State(rec): State<Arc<Recorded>>,
        Path(id): Path<String>,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        rec.answers.lock().push((id, body));
        Json(json!({"ok": true}))
    }

    async fn close(State(rec): State<Arc<Recorded>>, Path(id): Path<String>) -> Json<Value> {
        rec.closes.lock().push(id);
        Json(json!({"closed": true}))
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    async fn server() -> (HttpSignaling, Arc<Recorded>) {
        let rec = Arc::new(Recorded::default());
        let app = Router::new()
            .route("/channels", post(open_channel))
            .route("/channels/{id}/answer", post(answer))
            .route("/channels/{id}/close", post(close))
            .with_state(rec.clone());
        let addr = serve(app).await;
        let signaling = HttpSignaling::new(&ClientConfig::new(addr)).unwrap();
        (signaling, rec)
    }

    #[tokio::test]
    async fn full_exchange_against_server() {
        let (signaling, rec) = server().await;

        let session = signaling.open_session().await.unwrap();
        assert_eq!(session.id, "c1");
        assert_eq!(session.remote_offer.sdp_type, SdpType::Offer);
        assert_eq!(session.remote_candidates.len(), 1);

        let local = vec![Candidate::new("candidate:9 1 udp 1 192.168.1.9 6000 typ host")];
        let ack = signaling
            .submit_answer(&session, &SessionDescription::answer("v=0\r\n"), &local)
            .await
            .unwrap();
        assert_eq!(ack, Ack(json!({"ok": true})));

        {
            let answers = rec.answers.lock();
            assert_eq!(answers.len(), 1);
            let (id, body) = &answers[0];
            assert_eq!(id, "c1");
            assert_eq!(body["answer"]["type"], "answer");
            assert_eq!(body["ice_candidates"].as_array().unwrap().len(), 1);
        }

        signaling.close(Some(&session)).await.unwrap();
        assert_eq!(*rec.closes.lock(), vec!["c1".to_string()]);
    }

    #[tokio::test]
    async fn non_success_status_is_a_server_error() {
        let app = Router::new().route(
            "/channels",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "no capacity") }),
        );
        let signaling = HttpSignaling::new(&ClientConfig::new(serve(app).await)).unwrap();

        match signaling.open_session().await.unwrap_err() {
            ClientError::Server { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "no capacity");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_offer_is_a_server_error() {
        let app = Router::new().route("/channels", post(|| async { Json(json!({"nope": 1})) }));
        let signaling = HttpSignaling::new(&ClientConfig::new(serve(app).await)).unwrap();
        let err = signaling.open_session().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let signaling = HttpSignaling::new(&ClientConfig::new(addr)).unwrap();
        let err = signaling.open_session().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn channel_id_is_sent_as_one_segment() {
        let (signaling, rec) = server().await;
        let mut session = signaling.open_session().await.unwrap();
        session.id = "a/b?c#d".into();

        signaling.close_session(&session).await.unwrap();
        assert_eq!(*rec.closes.lock(), vec!["a/b?c#d".to_string()]);
    }

    #[test]
    fn endpoint_escapes_segments_under_base_path() {
        let signaling = HttpSignaling::new(&ClientConfig::new("http://signal.example/api/")).unwrap();
        assert_eq!(
            signaling.endpoint(&["channels", "a/b?c", "close"]).as_str(),
            "http://signal.example/api/channels/a%2Fb%3Fc/close"
        );
    }

    #[tokio::test]
    async fn close_without_session_makes_no_request() {
        let (signaling, rec) = server().await;
        let err = signaling.close(None).await.unwrap_err();
        assert_eq!(err.user_error(), Some(&UserError::NoSession));
        assert!(rec.closes.lock().is_empty());
    }
}
