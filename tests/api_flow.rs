//! End-to-end REST flows against a served instance.

mod common;

use std::collections::HashSet;

use uuid::Uuid;

use common::{api_client, spawn_server};
use courier::client::api::ApiClient;
use courier::client::ClientError;
use courier::models::ConversationKind;

fn assert_api_error(err: ClientError, status: u16, kind: &str) {
    match err {
        ClientError::Api {
            status: got_status,
            kind: got_kind,
            ..
        } => {
            assert_eq!(got_status, status);
            assert_eq!(got_kind, kind);
        }
        other => panic!("expected api error, got {other:?}"),
    }
}

#[tokio::test]
async fn direct_conversation_is_get_or_create() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let client_a = api_client(&server, a);
    let client_b = api_client(&server, b);

    let first = client_a.create_direct(b).await.unwrap();
    let again = client_a.create_direct(b).await.unwrap();
    let from_other_side = client_b.create_direct(a).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(first.id, from_other_side.id);
    assert_eq!(first.kind, ConversationKind::Direct);
    assert_eq!(first.participants.len(), 2);

    let err = client_a.create_direct(a).await.unwrap_err();
    assert_api_error(err, 400, "invalid_participants");
}

#[tokio::test]
async fn group_creation_enforces_member_minimum() {
    let server = spawn_server().await;
    let creator = Uuid::new_v4();
    let client = api_client(&server, creator);

    let err = client
        .create_group("too small", &[Uuid::new_v4()], None)
        .await
        .unwrap_err();
    assert_api_error(err, 400, "insufficient_members");

    let group = client
        .create_group(
            "big enough",
            &[Uuid::new_v4(), Uuid::new_v4()],
            Some("https://cdn.example/crew.png"),
        )
        .await
        .unwrap();
    assert_eq!(group.kind, ConversationKind::Group);
    assert_eq!(group.name.as_deref(), Some("big enough"));
    assert_eq!(group.image_url.as_deref(), Some("https://cdn.example/crew.png"));
    assert_eq!(group.participants.len(), 3);

    // The creation left a system message behind.
    let page = client.messages(group.id, None, 10).await.unwrap();
    assert_eq!(page.messages.len(), 1);
    assert_eq!(page.messages[0].sender_id, None);
}

#[tokio::test]
async fn empty_messages_are_rejected_and_not_persisted() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let client = api_client(&server, a);
    let convo = client.create_direct(b).await.unwrap();

    let err = client.send_message(convo.id, None, None).await.unwrap_err();
    assert_api_error(err, 400, "empty_message");

    let page = client.messages(convo.id, None, 10).await.unwrap();
    assert!(page.messages.is_empty());
}

#[tokio::test]
async fn outsiders_cannot_read_or_write() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let client_a = api_client(&server, a);
    let client_out = api_client(&server, outsider);
    let convo = client_a.create_direct(b).await.unwrap();

    let err = client_out.messages(convo.id, None, 10).await.unwrap_err();
    assert_api_error(err, 403, "not_a_participant");

    let err = client_out
        .send_message(convo.id, Some("let me in"), None)
        .await
        .unwrap_err();
    assert_api_error(err, 403, "not_a_participant");

    let err = client_out.conversation(Uuid::new_v4()).await.unwrap_err();
    assert_api_error(err, 404, "conversation_not_found");
}

#[tokio::test]
async fn requests_without_a_valid_token_are_rejected() {
    let server = spawn_server().await;
    let client = ApiClient::new(server.base_url.clone(), "garbage-token").unwrap();
    let err = client.unread_total().await.unwrap_err();
    assert_api_error(err, 401, "unauthorized");
}

#[tokio::test]
async fn unread_counts_follow_sends_and_seen_marks() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let client_a = api_client(&server, a);
    let client_b = api_client(&server, b);
    let convo = client_a.create_direct(b).await.unwrap();

    let sent = client_a
        .send_message(convo.id, Some("hi"), None)
        .await
        .unwrap();
    client_a
        .send_message(convo.id, Some("you there?"), None)
        .await
        .unwrap();

    assert_eq!(client_b.unread_total().await.unwrap().count, 2);
    assert_eq!(client_a.unread_total().await.unwrap().count, 0);

    // The conversation list is annotated with the count and last message.
    let listed = client_b.conversations(1, 20).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].unread_count, 2);
    let preview = listed[0].last_message.as_ref().expect("preview");
    assert_eq!(preview.content.as_deref(), Some("you there?"));

    let seen = client_b.mark_seen(convo.id).await.unwrap();
    assert_eq!(seen.updated, 2);
    assert_eq!(client_b.unread_total().await.unwrap().count, 0);

    // Idempotent: nothing left to stamp.
    let seen = client_b.mark_seen(convo.id).await.unwrap();
    assert_eq!(seen.updated, 0);

    // The sender now sees the seen-by stamp on their message.
    let page = client_a.messages(convo.id, None, 10).await.unwrap();
    let hi = page.messages.iter().find(|m| m.id == sent.id).unwrap();
    assert_eq!(hi.seen_by, vec![b]);
}

#[tokio::test]
async fn cursor_pagination_is_exactly_once_with_concurrent_sends() {
    let server = spawn_server().await;
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let client_a = api_client(&server, a);
    let client_b = api_client(&server, b);
    let convo = client_a.create_direct(b).await.unwrap();

    for i in 0..25 {
        let text = format!("m{i}");
        client_a
            .send_message(convo.id, Some(text.as_str()), None)
            .await
            .unwrap();
    }

    let mut ids = Vec::new();
    let mut seqs = Vec::new();
    let first = client_b.messages(convo.id, None, 10).await.unwrap();
    assert!(first.has_more);
    ids.extend(first.messages.iter().map(|m| m.id));
    seqs.extend(first.messages.iter().map(|m| m.seq));

    // Messages arriving between page fetches must not shift older pages.
    for i in 0..5 {
        let text = format!("interleaved{i}");
        client_b
            .send_message(convo.id, Some(text.as_str()), None)
            .await
            .unwrap();
    }

    let mut cursor = first.next_cursor;
    loop {
        let page = client_b
            .messages(convo.id, cursor, 10)
            .await
            .unwrap();
        ids.extend(page.messages.iter().map(|m| m.id));
        seqs.extend(page.messages.iter().map(|m| m.seq));
        if !page.has_more {
            break;
        }
        cursor = page.next_cursor;
    }

    let unique: HashSet<_> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 25, "every original message exactly once");
    assert_eq!(unique.len(), 25);
    assert!(seqs.windows(2).all(|w| w[0] > w[1]), "strictly descending");
}
