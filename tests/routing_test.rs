//! Chat routing and condition filtering across sessions.

mod common;

use common::{TestApp, CHANNELS};
use hubbub::{Channel, ChatOutcome, Condition, LocalDirectory, LocalRecipient, RichText};
use hubbub::{Recipient, SimpleChannel};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_permission_gates_delivery() {
    let directory = Arc::new(LocalDirectory::new());
    let with = Arc::new(LocalRecipient::new(Uuid::new_v4(), "with"));
    let without = Arc::new(LocalRecipient::new(Uuid::new_v4(), "without"));
    with.grant("permX");
    directory.insert(with.clone());
    directory.insert(without.clone());

    let channel = SimpleChannel::new("Secret", RichText::plain("[X] "), "x", directory)
        .with_conditions(vec![Condition::permission("permX")]);
    channel.add_listener(with.id());
    channel.add_listener(without.id());

    let report = channel.send_text("psst");
    assert_eq!(report.delivered, 1);
    assert_eq!(report.filtered, 1);
    assert_eq!(with.inbox_plain(), vec!["[X] psst"]);
    assert!(without.inbox().is_empty());
}

#[tokio::test]
async fn test_staff_channel_reaches_only_staff() {
    let t = TestApp::from_toml(CHANNELS);
    let admin = t.user("admin");
    let guest = t.user("guest");
    admin.grant("chat.staff");

    t.app.session_started(admin.id()).await.unwrap();
    t.app.session_started(guest.id()).await.unwrap();

    // The guest is not even listening, and cannot address the channel
    assert_eq!(t.app.chat(guest.id(), "# let me in"), ChatOutcome::Denied);

    match t.app.chat(admin.id(), "#meeting at 5") {
        ChatOutcome::Delivered(report) => assert_eq!(report.delivered, 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(admin.inbox_plain(), vec!["[S] admin: meeting at 5"]);
    assert!(guest.inbox().is_empty());
}

#[tokio::test]
async fn test_revoked_permission_applies_on_next_send() {
    let t = TestApp::from_toml(CHANNELS);
    let mod_user = t.user("mod");
    let admin = t.user("admin");
    mod_user.grant("chat.staff");
    admin.grant("chat.staff");
    t.app.session_started(mod_user.id()).await.unwrap();
    t.app.session_started(admin.id()).await.unwrap();

    mod_user.revoke("chat.staff");
    match t.app.chat(admin.id(), "#still here?") {
        ChatOutcome::Delivered(report) => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.filtered, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(mod_user.inbox().is_empty());
}

#[tokio::test]
async fn test_disconnected_listener_counts_offline() {
    let t = TestApp::from_toml(CHANNELS);
    let alice = t.user("alice");
    let bob = t.user("bob");
    t.app.session_started(alice.id()).await.unwrap();
    t.app.session_started(bob.id()).await.unwrap();

    // Bob's connection vanishes before his session end is processed
    t.directory.remove(bob.id());

    match t.app.chat(alice.id(), "anyone?") {
        ChatOutcome::Delivered(report) => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.offline, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_marker_routing_keeps_active_channel() {
    let t = TestApp::from_toml(CHANNELS);
    let alice = t.user("alice");
    t.app.session_started(alice.id()).await.unwrap();

    t.app.chat(alice.id(), "$wts sword");
    t.app.chat(alice.id(), "hello");

    assert_eq!(
        alice.inbox_plain(),
        vec!["[T] alice: wts sword", "[G] alice: hello"]
    );
}

#[tokio::test]
async fn test_channels_commands_end_to_end() {
    let t = TestApp::from_toml(CHANNELS);
    let alice = t.user("alice");
    t.app.session_started(alice.id()).await.unwrap();

    let help = t.app.command(alice.id(), "/channels");
    assert_eq!(help[0], "=== Channel commands ===");

    t.app.command(alice.id(), "/channels join trade");
    t.app.chat(alice.id(), "now in trade");
    assert_eq!(alice.inbox_plain(), vec!["[T] alice: now in trade"]);

    let info = t.app.command(alice.id(), "/ch info trade");
    assert!(info.contains(&"Listeners: 1".to_string()));
}

#[tokio::test]
async fn test_ignored_sender_hidden_across_sessions() {
    let t = TestApp::from_toml(CHANNELS);
    let alice = t.user("alice");
    let bob = t.user("bob");
    t.app.session_started(alice.id()).await.unwrap();
    t.app.session_started(bob.id()).await.unwrap();

    assert_eq!(t.app.command(bob.id(), "/channels ignore alice"), vec!["Ignoring alice."]);
    t.app.session_ended(bob.id()).await.unwrap();
    t.app.session_started(bob.id()).await.unwrap();

    match t.app.chat(alice.id(), "anyone here?") {
        ChatOutcome::Delivered(report) => {
            assert_eq!(report.delivered, 1);
            assert_eq!(report.ignored, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(bob.inbox().is_empty());
    assert_eq!(alice.inbox_plain(), vec!["[G] alice: anyone here?"]);
}
