use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::model::Booking;

/// Outbound notification channel (email, SMS, webhook — whatever the
/// embedding application wires in). Delivery is fire-and-forget from the
/// engine's point of view.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, to: &str, message: &str) -> Result<(), String>;
}

/// Default sink: log the message and call it delivered.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, to: &str, message: &str) -> Result<(), String> {
        tracing::info!(%to, %message, "notification");
        Ok(())
    }
}

/// Dispatches booking notifications on spawned tasks. Sink failures are
/// logged and swallowed; a lost email must never fail the booking.
pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub fn booking_confirmed(&self, booking: &Booking, seat_code: &str) {
        let message = render_booking(booking, seat_code, "confirmed");
        self.dispatch(booking.user_id.to_string(), message);
    }

    pub fn booking_canceled(&self, booking: &Booking, seat_code: &str) {
        let mut message = render_booking(booking, seat_code, "canceled");
        if let Some(reason) = &booking.cancellation_reason {
            message.push_str(&format!("\nReason: {reason}"));
        }
        self.dispatch(booking.user_id.to_string(), message);
    }

    fn dispatch(&self, to: String, message: String) {
        let sink = self.sink.clone();
        tokio::spawn(async move {
            if let Err(e) = sink.deliver(&to, &message).await {
                warn!(%to, error = %e, "notification delivery failed");
            }
        });
    }
}

fn render_booking(booking: &Booking, seat_code: &str, what: &str) -> String {
    format!(
        "Booking {} {what}\nSeat: {seat_code}\nPrice: {} {}\nStatus: {}",
        booking.id,
        booking.total_price,
        booking.currency,
        booking.status.name()
    )
}
