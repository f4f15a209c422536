use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::config::{Config, MessagesConfig, PromptConfig};
use crate::event::{IncomingEvent, Sender};
use crate::llm::{InferenceRequest, InferenceService};
use crate::telemetry::{self, EventKind, TelemetryRecord, TelemetrySink};

/// Routes each event to its handler and turns the outcome into exactly one
/// outbound message. Platform-agnostic and stateless between events.
pub struct Relay {
    inference: Arc<dyn InferenceService>,
    telemetry: Arc<dyn TelemetrySink>,
    prompts: PromptConfig,
    messages: MessagesConfig,
    telemetry_timeout: Duration,
}

impl Relay {
    pub fn new(
        config: &Config,
        inference: Arc<dyn InferenceService>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inference,
            telemetry,
            prompts: config.prompts.clone(),
            messages: config.messages.clone(),
            // One extra second over the HTTP client's own timeout
            telemetry_timeout: config.webhook.timeout() + Duration::from_secs(1),
        }
    }

    /// Reply used when a photo cannot even be fetched from the platform.
    pub fn image_fallback(&self) -> &str {
        &self.messages.image_fallback
    }

    /// Handle one event. `None` means no handler matched and nothing is sent.
    pub async fn handle(&self, event: IncomingEvent) -> Option<String> {
        match event {
            IncomingEvent::Command { name, .. } if name == "start" => {
                Some(self.messages.greeting.clone())
            }
            IncomingEvent::Command { .. } => None,
            IncomingEvent::Text { sender, text } => Some(self.handle_text(&sender, text).await),
            IncomingEvent::Photo { sender, image } => {
                Some(self.handle_photo(&sender, &image).await)
            }
        }
    }

    async fn handle_text(&self, sender: &Sender, text: String) -> String {
        let request = InferenceRequest::text(self.prompts.text_system.clone(), text.as_str());
        let reply = self
            .complete(&request, &self.messages.text_fallback, "text")
            .await;

        self.mirror(TelemetryRecord::new(EventKind::Text, sender, text, &reply))
            .await;
        reply
    }

    async fn handle_photo(&self, sender: &Sender, image: &[u8]) -> String {
        info!("Photo from {}: {} bytes", sender.id, image.len());

        let request = InferenceRequest::image(
            self.prompts.image_system.clone(),
            self.prompts.image_instruction.clone(),
            image,
        );
        let reply = self
            .complete(&request, &self.messages.image_fallback, "image")
            .await;

        self.mirror(TelemetryRecord::new(
            EventKind::Photo,
            sender,
            telemetry::photo_summary(image),
            &reply,
        ))
        .await;
        reply
    }

    /// Trimmed reply on success, `fallback` on any fault or an empty reply.
    async fn complete(&self, request: &InferenceRequest, fallback: &str, path: &str) -> String {
        match self.inference.complete(request).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    error!("Inference returned an empty {} reply", path);
                    fallback.to_string()
                } else {
                    reply.to_string()
                }
            }
            Err(e) => {
                error!("Error while requesting {} completion: {:#}", path, e);
                fallback.to_string()
            }
        }
    }

    async fn mirror(&self, record: TelemetryRecord) {
        telemetry::mirror(self.telemetry.clone(), record, self.telemetry_timeout).await;
    }
}
