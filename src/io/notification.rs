//! Persistent notification contract with the host
//!
//! A long-running background service without a visible notification is
//! terminated by the host, so the service presents one before touching any
//! provider and keeps it until stopped.

use serde::Serialize;

/// Logical channel a notification is posted to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationChannel {
    pub id: String,
    pub name: String,
    /// Low importance: no sound, no heads-up
    pub low_importance: bool,
}

/// Title/body/icon of the persistent notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub channel_id: String,
    pub title: String,
    pub body: String,
    pub icon: String,
    /// Not dismissable while the service runs
    pub ongoing: bool,
}

/// Host notification surface
pub trait NotificationHost: Send + Sync {
    /// Declare a channel; called once per channel before its first post
    fn declare_channel(&self, channel: &NotificationChannel);

    /// Post or update the notification under `notification_id`
    fn present(&self, notification_id: u32, payload: &NotificationPayload);

    /// Remove the notification
    fn release(&self, notification_id: u32);
}
