//! Dealer import message handlers
//!
//! Request/reply endpoints over NATS. Every request carries a JWT in its
//! envelope; the token's dealership scopes everything the caller can see.

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::auth::{self, AuthContext};
use crate::services::import_processor::{ImportError, ImportProcessor};
use crate::services::job_queue::{QueueJobRecord, QueueState};
use crate::types::{
    ErrorResponse, GetImportJobRequest, ImportJobIdRequest, ListResponse, QueueListRequest,
    Request, SubmitImportRequest, SuccessResponse,
};

/// Failure of a single request, rendered as an `ErrorResponse`
#[derive(Debug)]
pub struct HandlerError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerError {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }
}

impl From<ImportError> for HandlerError {
    fn from(err: ImportError) -> Self {
        let details = match &err {
            ImportError::FileTooLarge { size, limit } => {
                Some(serde_json::json!({ "size": size, "limit": limit }))
            }
            _ => None,
        };
        Self {
            code: err.code(),
            message: err.to_string(),
            details,
        }
    }
}

/// Request/reply loop shared by all import subjects. Every request is
/// answered on its own task, so a submit that waits for its job never holds
/// up the next message on the subject.
async fn serve<Req, Resp, F, Fut>(
    client: Client,
    mut subscriber: Subscriber,
    jwt_secret: Arc<String>,
    subject: &'static str,
    action: F,
) -> Result<()>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(AuthContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
{
    let action = Arc::new(action);
    while let Some(msg) = subscriber.next().await {
        debug!("Received {} message", subject);

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let answer = spawn_answer(action.clone(), jwt_secret.clone(), subject, msg.payload);
        let client = client.clone();
        tokio::spawn(async move {
            match answer.await {
                Ok(Ok(body)) => {
                    if let Err(e) = client.publish(reply, body.into()).await {
                        error!("Failed to publish reply: {}", e);
                    }
                }
                Ok(Err(e)) => error!("Failed to encode {} reply: {}", subject, e),
                Err(e) => error!("{} request task failed: {}", subject, e),
            }
        });
    }

    Ok(())
}

/// Answer one raw request on a task of its own
fn spawn_answer<Req, Resp, F, Fut, P>(
    action: Arc<F>,
    jwt_secret: Arc<String>,
    subject: &'static str,
    payload: P,
) -> JoinHandle<serde_json::Result<Vec<u8>>>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(AuthContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, HandlerError>> + Send + 'static,
    P: AsRef<[u8]> + Send + 'static,
{
    tokio::spawn(async move { answer(&*action, &jwt_secret, subject, payload.as_ref()).await })
}

/// Parse the envelope, authenticate, run `action` and encode the outcome
async fn answer<Req, Resp, F, Fut>(
    action: &F,
    jwt_secret: &str,
    subject: &'static str,
    payload: &[u8],
) -> serde_json::Result<Vec<u8>>
where
    Req: DeserializeOwned,
    Resp: Serialize,
    F: Fn(AuthContext, Req) -> Fut,
    Fut: Future<Output = Result<Resp, HandlerError>>,
{
    let request: Request<Req> = match serde_json::from_slice(payload) {
        Ok(req) => req,
        Err(e) => {
            error!("Failed to parse {} request: {}", subject, e);
            let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
            return serde_json::to_vec(&error);
        }
    };

    let auth = match auth::extract_auth(&request, jwt_secret) {
        Ok(auth) => auth,
        Err(e) => {
            let error = ErrorResponse::new(request.id, "UNAUTHORIZED", e.to_string());
            return serde_json::to_vec(&error);
        }
    };

    let request_id = request.id;
    match action(auth, request.payload).await {
        Ok(response) => serde_json::to_vec(&SuccessResponse::new(request_id, response)),
        Err(e) => {
            if e.code == "INTERNAL_ERROR" {
                error!("{} failed: {}", subject, e.message);
            } else {
                debug!("{} rejected ({}): {}", subject, e.code, e.message);
            }
            let mut error = ErrorResponse::new(request_id, e.code, e.message);
            if let Some(details) = e.details {
                error = error.with_details(details);
            }
            serde_json::to_vec(&error)
        }
    }
}

/// Handle dealer.import.submit
pub async fn handle_submit(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.submit", move |auth, payload: SubmitImportRequest| {
        let processor = processor.clone();
        async move {
            let upload = processor.decode_upload(payload)?;
            Ok(processor.submit(&auth, upload).await?)
        }
    })
    .await
}

/// Handle dealer.import.preview
pub async fn handle_preview(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.preview", move |_auth, payload: SubmitImportRequest| {
        let processor = processor.clone();
        async move {
            let upload = processor.decode_upload(payload)?;
            Ok(processor.preview(upload).await?)
        }
    })
    .await
}

/// Handle dealer.import.job.get
pub async fn handle_get_job(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.job.get", move |auth, payload: GetImportJobRequest| {
        let processor = processor.clone();
        async move {
            Ok(processor
                .get_job(&auth, payload.job_id, payload.page, payload.per_page)
                .await?)
        }
    })
    .await
}

/// Handle dealer.import.errors.download
pub async fn handle_download_errors(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.errors.download", move |auth, payload: ImportJobIdRequest| {
        let processor = processor.clone();
        async move { Ok(processor.download_errors(&auth, payload.job_id).await?) }
    })
    .await
}

/// Handle dealer.import.cancel
pub async fn handle_cancel(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.cancel", move |auth, payload: ImportJobIdRequest| {
        let processor = processor.clone();
        async move { Ok(processor.cancel(&auth, payload.job_id).await?) }
    })
    .await
}

/// Handle dealer.import.queue.list
pub async fn handle_queue_list(
    client: Client,
    subscriber: Subscriber,
    jwt_secret: Arc<String>,
    processor: Arc<ImportProcessor>,
) -> Result<()> {
    serve(client, subscriber, jwt_secret, "dealer.import.queue.list", move |auth, payload: QueueListRequest| {
        let processor = processor.clone();
        async move { list_queue(&processor, &auth, payload) }
    })
    .await
}

fn list_queue(
    processor: &ImportProcessor,
    auth: &AuthContext,
    request: QueueListRequest,
) -> Result<ListResponse<QueueJobRecord>, HandlerError> {
    let state = match request.state.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(QueueState::parse(raw).ok_or_else(|| {
            HandlerError::new(
                "INVALID_REQUEST",
                format!("unknown queue state '{}' (expected waiting, active, completed or failed)", raw),
            )
        })?),
    };
    let items = processor.list_queue(auth, state);
    Ok(ListResponse {
        total: items.len() as i64,
        items,
    })
}
