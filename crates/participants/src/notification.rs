//! Notification participant.
//!
//! Purely reactive: consumes `notifications.send`, renders the named
//! template and delivers through the named channel. No outbound events.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::CustomerId;
use events::{EventEnvelope, EventPayload, NotificationSendData};

use crate::error::{ParticipantError, Result};

/// Rendered notification variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub subject: String,
    pub body: String,
    /// Short form for length-limited channels.
    pub sms: String,
}

fn var(variables: &HashMap<String, serde_json::Value>, key: &str) -> String {
    match variables.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => "?".to_string(),
    }
}

/// Renders a template by id with the provided variables.
///
/// Unknown template ids fall back to a generic dump of the variables so a
/// miswired producer is visible rather than silent.
pub fn render(template_id: &str, variables: &HashMap<String, serde_json::Value>) -> NotificationContent {
    match template_id {
        "order-confirmed" => {
            let order_id = var(variables, "orderId");
            let total = var(variables, "totalAmount");
            let currency = var(variables, "currency");
            NotificationContent {
                subject: format!("Your order {order_id} is confirmed!"),
                body: format!(
                    "Your order {order_id} for {currency} {total} has been confirmed."
                ),
                sms: format!("Order {order_id} confirmed. Total: {currency} {total}."),
            }
        }
        "order-cancelled" => {
            let order_id = var(variables, "orderId");
            let reason = var(variables, "reason");
            NotificationContent {
                subject: format!("Order {order_id} has been cancelled"),
                body: format!(
                    "Your order {order_id} was cancelled. Reason: {reason}. \
                     Any charges will be refunded."
                ),
                sms: format!("Order {order_id} cancelled. Reason: {reason}."),
            }
        }
        _ => {
            let dump = serde_json::to_string(variables).unwrap_or_default();
            NotificationContent {
                subject: "Platform notification".to_string(),
                body: dump.clone(),
                sms: dump,
            }
        }
    }
}

/// Delivery seam: email, sms, webhook, …
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// A recorded delivery, for assertions.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Test channel that records every delivery.
#[derive(Clone, Default)]
pub struct RecordingChannel {
    deliveries: Arc<RwLock<Vec<Delivery>>>,
}

impl RecordingChannel {
    /// Creates an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all deliveries so far.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().unwrap().clone()
    }

    /// Number of deliveries so far.
    pub fn sent_count(&self) -> usize {
        self.deliveries.read().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.deliveries.write().unwrap().push(Delivery {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Routes `notifications.send` events to the right channel.
#[derive(Clone, Default)]
pub struct NotificationParticipant {
    channels: HashMap<String, Arc<dyn NotificationChannel>>,
}

impl NotificationParticipant {
    /// Creates a participant with no channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel under a name (`email`, `sms`, …).
    pub fn with_channel(
        mut self,
        name: impl Into<String>,
        channel: Arc<dyn NotificationChannel>,
    ) -> Self {
        self.channels.insert(name.into(), channel);
        self
    }

    /// Routes one inbound event.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        match &envelope.payload {
            EventPayload::NotificationSend(data) => self.send(data).await,
            _ => {
                tracing::debug!(
                    event_type = envelope.event_type(),
                    "event is not a notification input, ignoring"
                );
                Ok(())
            }
        }
    }

    async fn send(&self, data: &NotificationSendData) -> Result<()> {
        let content = render(&data.template_id, &data.variables);

        // Unknown channels fall back to email, matching producer defaults.
        let channel = self
            .channels
            .get(&data.channel)
            .or_else(|| self.channels.get("email"))
            .ok_or_else(|| ParticipantError::UnknownChannel(data.channel.clone()))?;

        let to = resolve_contact(&data.customer_id, &data.channel);
        let body = if data.channel == "sms" {
            &content.sms
        } else {
            &content.body
        };

        channel.send(&to, &content.subject, body).await?;

        tracing::info!(
            customer_id = %data.customer_id,
            channel = %data.channel,
            template_id = %data.template_id,
            "notification sent"
        );
        Ok(())
    }
}

/// Stand-in for the user-service lookup of a customer's contact address.
fn resolve_contact(customer_id: &CustomerId, channel: &str) -> String {
    if channel == "sms" {
        let digits = customer_id
            .as_str()
            .bytes()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)))
            % 10_000_000;
        format!("+1555{digits:07}")
    } else {
        format!("{customer_id}@platform.example.com")
    }
}
