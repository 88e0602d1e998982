//! Chat orchestration: validate, persist, call the gateway, persist the reply.
//!
//! All transports call through here so metrics and persistence are
//! recorded the same way regardless of how the request arrived.

use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::gateway::ChatGateway;
use crate::history::ChatHistory;
use crate::metrics::Metrics;
use crate::types::{ChatMessage, ChatRequest, ChatSession, ImageData, MessageRole, NewMessage};

/// Outcome of a successful chat round trip.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: ChatMessage,
    pub session_id: Uuid,
}

/// Stateless method collection; all state is borrowed from `ServiceState`.
pub struct ChatService;

impl ChatService {
    /// Sends a user message and returns the assistant reply.
    ///
    /// The session is resolved (or created) and becomes current. The user
    /// message is persisted before the gateway call, so it stays in the
    /// history even when the gateway fails.
    pub async fn send(
        history: &ChatHistory,
        gateway: &dyn ChatGateway,
        metrics: &Metrics,
        request: ChatRequest,
        session_id: Option<Uuid>,
    ) -> Result<ChatReply, ServiceError> {
        if let Err(err) = validate(&request) {
            metrics.record_error(err.kind());
            if request.image.is_some() {
                metrics.record_image_upload("invalid");
            }
            return Err(err);
        }

        let session = history.get_or_create_session(session_id).await?;
        let span = tracing::info_span!(
            "chat.send",
            session_id = %session.id,
            model = %request.model,
            has_image = request.image.is_some(),
        );
        Self::exchange(history, gateway, metrics, &request, &session)
            .instrument(span)
            .await
    }

    async fn exchange(
        history: &ChatHistory,
        gateway: &dyn ChatGateway,
        metrics: &Metrics,
        request: &ChatRequest,
        session: &ChatSession,
    ) -> Result<ChatReply, ServiceError> {
        let started = Instant::now();

        history
            .add_message(NewMessage::new(
                session.id,
                MessageRole::User,
                request.message.clone(),
            ))
            .await?;
        metrics.record_message(MessageRole::User.as_str(), request.message.chars().count());

        let context = history.gateway_messages(session.id).await?;
        tracing::debug!(context_messages = context.len(), "sending to gateway");

        let completion = match gateway
            .send(&context, &request.model, request.image.as_ref())
            .await
        {
            Ok(completion) => completion,
            Err(err) => {
                metrics.record_gateway_request(err.kind());
                metrics.record_chat_request(&request.model, "error", started.elapsed());
                metrics.record_error("gateway");
                if request.image.is_some() {
                    metrics.record_image_upload("error");
                }
                tracing::error!(error = %err, kind = err.kind(), "gateway call failed");
                return Err(err.into());
            }
        };
        metrics.record_gateway_request("success");

        let elapsed = started.elapsed();
        let usage = completion.usage.unwrap_or_default();
        let stored = history
            .add_message(NewMessage {
                model: Some(request.model.clone()),
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                response_time: Some(elapsed.as_secs_f64()),
                ..NewMessage::new(session.id, MessageRole::Assistant, completion.content)
            })
            .await?;

        metrics.record_message(
            MessageRole::Assistant.as_str(),
            stored.content.chars().count(),
        );
        metrics.record_chat_request(&request.model, "success", elapsed);
        if request.image.is_some() {
            metrics.record_image_upload("success");
        }
        tracing::info!(
            response_length = stored.content.len(),
            duration_ms = elapsed.as_millis() as u64,
            "chat reply stored"
        );

        Ok(ChatReply {
            message: ChatMessage::from(&stored),
            session_id: session.id,
        })
    }
}

fn validate(request: &ChatRequest) -> Result<(), ServiceError> {
    if request.message.trim().is_empty() {
        return Err(ServiceError::Validation("Message must not be empty".into()));
    }
    if let Some(image) = &request.image {
        validate_image(image)?;
    }
    Ok(())
}

fn validate_image(image: &ImageData) -> Result<(), ServiceError> {
    if !image.media_type.starts_with("image/") {
        return Err(ServiceError::Validation(format!(
            "Unsupported image media type: {}",
            image.media_type
        )));
    }
    if image.base64_data.is_empty() || STANDARD.decode(&image.base64_data).is_err() {
        return Err(ServiceError::Validation(
            "Image data is not valid base64".into(),
        ));
    }
    Ok(())
}
