//! The optimistic send/reconcile loop, run against a real server: the
//! sender's cache resolves by correlation id, the recipient's cache merges
//! the push with a later REST re-fetch without duplicating anything.

mod common;

use uuid::Uuid;

use common::{api_client, connected_session, spawn_server, wait_for_event};
use courier::client::cache::{ChatCache, Entry};
use courier::websocket::events::ChannelEvent;

#[tokio::test]
async fn optimistic_send_resolves_to_a_single_confirmed_entry() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let client_a = api_client(&server, a);
    let client_b = api_client(&server, b);
    let convo = client_a.create_direct(b).await.unwrap();

    let (session_b, mut events_b) = connected_session(&server, b).await;

    // Sender side: render immediately, then reconcile with the response.
    let mut cache_a = ChatCache::new();
    let correlation = cache_a.begin_send(convo.id, Some("lunch?".into()), None);
    assert_eq!(cache_a.entries(convo.id).len(), 1);
    assert!(matches!(cache_a.entries(convo.id)[0], Entry::Pending(_)));

    let confirmed = client_a
        .send_message(convo.id, Some("lunch?"), None)
        .await
        .unwrap();
    cache_a.confirm_send(correlation, confirmed.clone());

    let entries = cache_a.entries(convo.id);
    assert_eq!(entries.len(), 1);
    match &entries[0] {
        Entry::Confirmed(m) => assert_eq!(m.id, confirmed.id),
        other => panic!("pending entry survived resolution: {other:?}"),
    }

    // Recipient side: push event first, REST re-fetch second; still one copy.
    let mut cache_b = ChatCache::new();
    let pushed = wait_for_event(&mut events_b, |e| {
        matches!(e, ChannelEvent::MessageNew { .. })
    })
    .await;
    cache_b.apply_event(&pushed);

    let updated = wait_for_event(&mut events_b, |e| {
        matches!(e, ChannelEvent::ConversationUpdated { .. })
    })
    .await;
    cache_b.apply_event(&updated);
    assert_eq!(cache_b.unread(convo.id), 1);

    let page = client_b.messages(convo.id, None, 50).await.unwrap();
    cache_b.merge_page(convo.id, &page);
    assert_eq!(cache_b.entries(convo.id).len(), 1);

    // Opening zeroes the badge optimistically; the server confirms it.
    cache_b.open_conversation(convo.id);
    assert_eq!(cache_b.unread(convo.id), 0);
    client_b.mark_seen(convo.id).await.unwrap();
    let zeroed = wait_for_event(&mut events_b, |e| {
        matches!(e, ChannelEvent::ConversationUpdated { .. })
    })
    .await;
    cache_b.apply_event(&zeroed);
    assert_eq!(cache_b.unread(convo.id), 0);

    session_b.shutdown().await;
}
