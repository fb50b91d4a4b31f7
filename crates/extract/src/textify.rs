//! Textual projections of non-text message payloads.

use crate::message::FunctionalEvent;

/// Category keys of `textifyed_contents`.
pub mod category {
  pub const TEXT: &str = "text";
  pub const IMAGE: &str = "image";
  pub const DOCUMENT: &str = "document";
  pub const AUDIO: &str = "audio";
  pub const VOICE: &str = "voice";
  pub const LOCATION: &str = "location";
  pub const CONTACT: &str = "contact";
  pub const VENUE: &str = "venue";
  pub const FUNCTIONAL_MESSAGE: &str = "functional_message";
}

pub fn location_text(latitude: f64, longitude: f64) -> String {
  format!("Latitude: {latitude}, Longitude: {longitude}")
}

pub fn contact_text(first_name: &str, phone_number: &str) -> String {
  format!("Name: {first_name}, Phone: {phone_number}")
}

pub fn venue_text(title: &str, address: &str) -> String {
  format!("Title: {title}, Address: {address}")
}

pub fn voice_text(mime_type: &str, duration: i32) -> String {
  format!("MIME type: {mime_type}, duration: {duration}s")
}

/// First whitespace-delimited token of the event's rendering, which is its
/// bare type name.
pub fn functional_text(event: &FunctionalEvent) -> String {
  let rendered = event.to_string();
  rendered.split_whitespace().next().unwrap_or_default().to_string()
}
