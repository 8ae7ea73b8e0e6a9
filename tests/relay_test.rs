//! End-to-end message fan-out over the catalog queries.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use tea_tracking::models::{Message, now_ms};
use tea_tracking::relay::{self, spawn_inbox};
use tea_tracking::store::{Catalog, MessageFilter};

async fn wait_len(rx: &mut watch::Receiver<Vec<Message>>, want: usize) -> Vec<Message> {
    timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if snapshot.len() == want {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("inbox task stopped");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("inbox never reached {want} messages"))
}

/// Scenario C: a broadcast reaches both a vehicle-scoped subscriber and a
/// user-scoped subscriber exactly once each, even though both subscribe to
/// "broadcast union own-scope".
#[tokio::test]
async fn scenario_c_broadcast_reaches_each_subscriber_once() {
    let catalog = Catalog::new();
    let (mut driver_inbox, driver_task) =
        spawn_inbox(&catalog, MessageFilter::Vehicle("V1".to_string()), 80).await;
    let (mut user_inbox, user_task) =
        spawn_inbox(&catalog, MessageFilter::User("u1".to_string()), 80).await;

    let sent = catalog
        .send_message(Message::broadcast(
            Some("Notice".to_string()),
            "Depot closed Friday",
            now_ms(),
        ))
        .await;

    let (driver_msgs, user_msgs) = futures::join!(
        wait_len(&mut driver_inbox, 1),
        wait_len(&mut user_inbox, 1)
    );

    assert_eq!(driver_msgs[0].id, sent.id);
    assert_eq!(user_msgs[0].id, sent.id);

    driver_task.abort();
    user_task.abort();
}

/// A vehicle-scoped message lands only in that vehicle's inbox, merged with
/// broadcasts and sorted newest first.
#[tokio::test]
async fn scoped_messages_stay_in_their_scope() {
    let catalog = Catalog::new();
    let (mut v1_inbox, v1_task) =
        spawn_inbox(&catalog, MessageFilter::Vehicle("V1".to_string()), 80).await;
    let (mut v2_inbox, v2_task) =
        spawn_inbox(&catalog, MessageFilter::Vehicle("V2".to_string()), 80).await;

    catalog
        .send_message(Message::broadcast(None, "for everyone", 1_000))
        .await;
    catalog
        .send_message(Message::to_vehicle("V1", None, "only V1", 2_000))
        .await;

    let v1_msgs = wait_len(&mut v1_inbox, 2).await;
    assert_eq!(v1_msgs[0].body, "only V1");
    assert_eq!(v1_msgs[1].body, "for everyone");

    let v2_msgs = wait_len(&mut v2_inbox, 1).await;
    assert_eq!(v2_msgs[0].body, "for everyone");

    v1_task.abort();
    v2_task.abort();
}

/// P6 end to end: double acknowledgement leaves one read-receipt, and the
/// unread count reflects it through the subscription.
#[tokio::test]
async fn mark_as_read_is_idempotent_through_the_inbox() {
    let catalog = Catalog::new();
    let (mut inbox, task) =
        spawn_inbox(&catalog, MessageFilter::Vehicle("V1".to_string()), 80).await;

    let msg = catalog
        .send_message(Message::to_vehicle("V1", None, "ack me", now_ms()))
        .await;
    let msgs = wait_len(&mut inbox, 1).await;
    assert_eq!(relay::unread_count(&msgs, "d1"), 1);

    catalog.mark_read(&msg.id, "d1").await.unwrap();
    catalog.mark_read(&msg.id, "d1").await.unwrap();

    let msgs = timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = inbox.borrow_and_update();
                if snapshot.first().is_some_and(|m| m.is_read_by("d1")) {
                    return snapshot.clone();
                }
            }
            inbox.changed().await.expect("inbox task stopped");
        }
    })
    .await
    .expect("read receipt never arrived");

    assert_eq!(msgs[0].read_by, ["d1"]);
    assert_eq!(relay::unread_count(&msgs, "d1"), 0);

    task.abort();
}

/// The merged inbox stays bounded by the message window.
#[tokio::test]
async fn inbox_is_bounded_by_the_window() {
    let catalog = Catalog::new();
    let (mut inbox, task) =
        spawn_inbox(&catalog, MessageFilter::Vehicle("V1".to_string()), 5).await;

    for i in 0..8 {
        catalog
            .send_message(Message::broadcast(None, format!("m{i}"), 1_000 + i))
            .await;
    }

    let msgs = timeout(Duration::from_secs(2), async {
        loop {
            {
                let snapshot = inbox.borrow_and_update();
                if snapshot.first().is_some_and(|m| m.body == "m7") {
                    return snapshot.clone();
                }
            }
            inbox.changed().await.expect("inbox task stopped");
        }
    })
    .await
    .expect("inbox never settled on the newest window");

    assert_eq!(msgs.len(), 5);
    assert_eq!(msgs[4].body, "m3");

    task.abort();
}
