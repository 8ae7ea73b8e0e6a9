//! Messaging/alerts relay: scoped fan-out of immutable documents.
//!
//! A consumer reads the union of the broadcast query and its own scope
//! query. The two streams arrive independently and overlap; the union is
//! merged by a deduplicating accumulator keyed by document id and re-sorted
//! on every update. No arrival order is assumed across the two streams.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{Result, TrackingError};
use crate::models::{now_ms, AlertDoc, AlertKind, AlertStatus, Message, UserDoc};
use crate::store::{Catalog, MessageFilter};

/// Client-side union of the two inbox queries.
pub struct Inbox {
    window: usize,
    broadcast: Vec<Message>,
    scoped: Vec<Message>,
}

impl Inbox {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            broadcast: Vec::new(),
            scoped: Vec::new(),
        }
    }

    pub fn apply_broadcast(&mut self, snapshot: Vec<Message>) {
        self.broadcast = snapshot;
    }

    pub fn apply_scoped(&mut self, snapshot: Vec<Message>) {
        self.scoped = snapshot;
    }

    /// Merged view: one entry per document id even when a message shows up
    /// in both snapshots, newest first, bounded by the window.
    pub fn merged(&self) -> Vec<Message> {
        let mut seen = std::collections::HashSet::new();
        let mut list: Vec<Message> = self
            .broadcast
            .iter()
            .chain(self.scoped.iter())
            .filter(|m| seen.insert(m.id.clone()))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms).then(a.id.cmp(&b.id)));
        list.truncate(self.window);
        list
    }

    pub fn unread_count(&self, uid: &str) -> usize {
        unread_count(&self.merged(), uid)
    }
}

pub fn unread_count(messages: &[Message], uid: &str) -> usize {
    messages.iter().filter(|m| !m.is_read_by(uid)).count()
}

/// Inbox search box: case-insensitive match over title, body and vehicle id.
pub fn matches_search(msg: &Message, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return true;
    }
    let hay = format!(
        "{} {} {}",
        msg.title.as_deref().unwrap_or(""),
        msg.body,
        msg.vehicle_id.as_deref().unwrap_or(""),
    )
    .to_lowercase();
    hay.contains(&q)
}

/// Follows the broadcast and scope queries for one consumer and publishes
/// the deduplicated union. Aborting the task tears both subscriptions down.
pub async fn spawn_inbox(
    catalog: &Catalog,
    scope: MessageFilter,
    window: usize,
) -> (watch::Receiver<Vec<Message>>, JoinHandle<()>) {
    let mut broadcast_rx = catalog
        .subscribe_messages(MessageFilter::Broadcast, window)
        .await;
    let mut scoped_rx = catalog.subscribe_messages(scope, window).await;

    let mut inbox = Inbox::new(window);
    inbox.apply_broadcast(broadcast_rx.borrow_and_update().clone());
    inbox.apply_scoped(scoped_rx.borrow_and_update().clone());
    let (tx, rx) = watch::channel(inbox.merged());

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                res = broadcast_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                    inbox.apply_broadcast(broadcast_rx.borrow_and_update().clone());
                }
                res = scoped_rx.changed() => {
                    if res.is_err() {
                        break;
                    }
                    inbox.apply_scoped(scoped_rx.borrow_and_update().clone());
                }
            }
            tx.send_replace(inbox.merged());
        }
        // Surfaced once; the consumer keeps its last snapshot.
        warn!("inbox subscription ended");
    });

    (rx, handle)
}

/// Driver-side quick alert. The message is required; the alert carries the
/// driver's current vehicle and route for admin triage.
pub async fn send_quick_alert(
    catalog: &Catalog,
    driver: &UserDoc,
    kind: AlertKind,
    message: &str,
) -> Result<AlertDoc> {
    let body = message.trim();
    if body.is_empty() {
        return Err(TrackingError::EmptyField("message"));
    }
    let vehicle_id = driver
        .vehicle_id
        .clone()
        .ok_or(TrackingError::NotFound("vehicle"))?;

    let draft = AlertDoc {
        id: String::new(),
        kind,
        message: body.to_string(),
        created_at_ms: now_ms(),
        driver_uid: driver.uid.clone(),
        vehicle_id,
        route_id: driver.route_id.clone(),
        status: AlertStatus::New,
        resolved_at_ms: None,
    };
    Ok(catalog.report_alert(draft).await)
}

/// Admin badge: alerts nobody has looked at yet.
pub fn new_alert_count(alerts: &[AlertDoc]) -> usize {
    alerts
        .iter()
        .filter(|a| a.status == AlertStatus::New)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn msg(id: &str, created_at_ms: i64) -> Message {
        let mut m = Message::broadcast(None, format!("body-{id}"), created_at_ms);
        m.id = id.to_string();
        m
    }

    #[test]
    fn overlapping_snapshots_collapse_to_one_entry_per_id() {
        let mut inbox = Inbox::new(80);
        inbox.apply_broadcast(vec![msg("a", 3), msg("b", 2)]);
        inbox.apply_scoped(vec![msg("a", 3), msg("c", 1)]);

        let merged = inbox.merged();
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn merged_is_sorted_newest_first_and_bounded() {
        let mut inbox = Inbox::new(2);
        inbox.apply_broadcast(vec![msg("old", 1), msg("mid", 5)]);
        inbox.apply_scoped(vec![msg("new", 9)]);

        let merged = inbox.merged();
        let ids: Vec<&str> = merged.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid"]);
    }

    #[test]
    fn reapplying_a_snapshot_does_not_duplicate() {
        let mut inbox = Inbox::new(80);
        inbox.apply_broadcast(vec![msg("a", 1)]);
        inbox.apply_broadcast(vec![msg("a", 1)]);
        assert_eq!(inbox.merged().len(), 1);
    }

    #[test]
    fn unread_counts_messages_missing_the_reader() {
        let mut read = msg("a", 2);
        read.read_by.push("u1".to_string());
        let unread = msg("b", 1);

        assert_eq!(unread_count(&[read.clone(), unread.clone()], "u1"), 1);
        assert_eq!(unread_count(&[read, unread], "u2"), 2);
    }

    #[test]
    fn search_matches_title_body_and_vehicle() {
        let mut m = Message::to_vehicle("V2", Some("Depot change".to_string()), "go to gate 3", 1);
        m.id = "x".to_string();

        assert!(matches_search(&m, ""));
        assert!(matches_search(&m, "depot"));
        assert!(matches_search(&m, "GATE"));
        assert!(matches_search(&m, "v2"));
        assert!(!matches_search(&m, "harbor"));
    }

    #[tokio::test]
    async fn quick_alert_requires_a_message_and_a_vehicle() {
        let catalog = Catalog::new();
        let driver = UserDoc {
            uid: "d1".to_string(),
            role: Role::Driver,
            name: None,
            email: "d1@tea.lk".to_string(),
            vehicle_id: Some("V1".to_string()),
            route_id: Some("R1".to_string()),
            photo_url: None,
            created_at: 0,
        };

        let err = send_quick_alert(&catalog, &driver, AlertKind::Breakdown, "   ")
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::EmptyField("message")));

        let alert = send_quick_alert(&catalog, &driver, AlertKind::Delay, "stuck at the pass")
            .await
            .unwrap();
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(alert.vehicle_id, "V1");
        assert_eq!(new_alert_count(&catalog.watch_alerts().borrow()), 1);
    }
}
