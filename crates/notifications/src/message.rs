//! Confirmation message contents.

use booking_store::{Money, ReservationId, StallSize};
use chrono::{DateTime, Utc};
use domain::{ReservationDetails, UserProfile};
use serde::Serialize;

/// A reservation confirmation addressed to one exhibitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationMessage {
    pub reservation_id: ReservationId,
    pub recipient_email: String,
    pub recipient_name: String,
    pub business_name: Option<String>,
    pub stall_code: String,
    pub stall_size: StallSize,
    pub stall_location: String,
    pub stall_dimensions: String,
    pub total_amount: Money,
    pub booked_at: DateTime<Utc>,
}

impl ConfirmationMessage {
    /// Builds the message for a confirmed reservation.
    pub fn new(details: &ReservationDetails, recipient: &UserProfile) -> Self {
        let ReservationDetails { reservation, stall } = details;
        Self {
            reservation_id: reservation.id,
            recipient_email: recipient.email.clone(),
            recipient_name: recipient.name.clone(),
            business_name: recipient.business_name.clone(),
            stall_code: stall.code.clone(),
            stall_size: stall.size,
            stall_location: stall.location.clone(),
            stall_dimensions: stall.dimensions.clone(),
            total_amount: reservation.total_amount,
            booked_at: reservation.created_at,
        }
    }

    /// Subject line of the confirmation email.
    pub fn subject(&self) -> String {
        format!("Bookfair Reservation Confirmed - {}", self.stall_code)
    }

    /// Payload encoded into the entry pass. The reservation ID is the pass.
    pub fn pass_payload(&self) -> String {
        self.reservation_id.to_string()
    }

    /// Plain-text body of the confirmation email.
    pub fn body(&self) -> String {
        let business = self
            .business_name
            .as_deref()
            .map(|b| format!("Business: {b}\n"))
            .unwrap_or_default();
        format!(
            "Dear {name},\n\n\
             Your stall reservation has been confirmed.\n\n\
             {business}\
             Stall: {code}\n\
             Size: {size}\n\
             Location: {location}\n\
             Dimensions: {dimensions}\n\
             Amount: {amount}\n\
             Reserved on: {booked}\n\n\
             Present this code at the entrance: {pass}\n",
            name = self.recipient_name,
            code = self.stall_code,
            size = self.stall_size,
            location = self.stall_location,
            dimensions = self.stall_dimensions,
            amount = self.total_amount,
            booked = self.booked_at.format("%Y-%m-%d"),
            pass = self.pass_payload(),
        )
    }
}
