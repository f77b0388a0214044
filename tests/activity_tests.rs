//! Integration tests for the activity builder

use beacon::activity::{Activity, PARTY_MAX_SIZE};
use beacon::session;

#[tokio::test]
async fn test_solo_payload_has_no_party() -> anyhow::Result<()> {
    let activity = Activity::new();
    let payload = activity.generate(false).await?;

    assert!(payload.party.is_none());
    assert!(payload.join_secret.is_none());
    assert!(payload.spectate_secret.is_none());
    assert!(payload.start_timestamp.is_some());
    assert_eq!(payload.details.as_deref(), Some("Working solo"));

    Ok(())
}

#[tokio::test]
async fn test_party_id_starts_session() -> anyhow::Result<()> {
    let mut activity = Activity::new();
    activity.change_party_id(Some("abc".to_string()));

    assert_eq!(activity.party_id(), Some("abc"));
    assert_eq!(activity.party_size(), 1, "local user counts as first member");

    let payload = activity.generate(false).await?;
    let party = payload.party.expect("party should be present");
    assert_eq!(party.id, "abc");
    assert_eq!(party.size, 1);
    assert_eq!(party.max_size, PARTY_MAX_SIZE);

    Ok(())
}

#[test]
fn test_clearing_party_id_resets_membership() {
    let mut activity = Activity::new();
    activity.change_party_id(Some("abc".to_string()));
    activity.increase_party_size(3);

    activity.change_party_id(None);

    assert_eq!(activity.party_id(), None);
    assert_eq!(activity.party_size(), 0);
}

#[test]
fn test_empty_party_id_clears() {
    let mut activity = Activity::new();
    activity.change_party_id(Some("abc".to_string()));
    activity.change_party_id(Some(String::new()));

    assert_eq!(activity.party_id(), None);
}

#[test]
fn test_party_size_never_goes_negative() {
    let mut activity = Activity::new();
    activity.increase_party_size(2);
    activity.decrease_party_size(5);

    assert_eq!(activity.party_size(), 0);
}

#[tokio::test]
async fn test_secrets_follow_permission_flags() -> anyhow::Result<()> {
    let mut activity = Activity::new();
    activity.change_party_id(Some("abc".to_string()));

    let payload = activity.generate(false).await?;
    assert!(payload.join_secret.is_none());
    assert!(payload.spectate_secret.is_none());

    activity.allow_join_requests();
    activity.allow_spectate();
    let payload = activity.generate(false).await?;

    let join_secret = payload.join_secret.expect("join secret");
    assert_eq!(
        session::locator_from_secret(&join_secret)?,
        session::join_locator("abc")
    );
    let spectate_secret = payload.spectate_secret.expect("spectate secret");
    assert_eq!(
        session::locator_from_secret(&spectate_secret)?,
        session::spectate_locator("abc")
    );

    activity.disable_join_requests();
    activity.disable_spectate();
    let payload = activity.generate(false).await?;
    assert!(payload.join_secret.is_none());
    assert!(payload.spectate_secret.is_none());

    Ok(())
}

#[tokio::test]
async fn test_secrets_require_a_party() -> anyhow::Result<()> {
    let mut activity = Activity::new();
    activity.allow_join_requests();
    activity.allow_spectate();

    // Flags alone advertise nothing while working solo
    let payload = activity.generate(false).await?;
    assert!(payload.join_secret.is_none());
    assert!(payload.spectate_secret.is_none());

    Ok(())
}

#[tokio::test]
async fn test_elapsed_time_anchor_selection() -> anyhow::Result<()> {
    let mut activity = Activity::new();

    // Without a session, both anchors fall back to the editor start
    let editor_anchor = activity.generate(true).await?.start_timestamp;
    assert_eq!(editor_anchor, activity.generate(false).await?.start_timestamp);

    activity.change_party_id(Some("abc".to_string()));
    let session_anchor = activity.generate(true).await?.start_timestamp;
    assert!(session_anchor >= editor_anchor);

    Ok(())
}

#[test]
fn test_dispose_resets_everything() {
    let mut activity = Activity::new();
    activity.change_party_id(Some("abc".to_string()));
    activity.increase_party_size(2);
    activity.allow_spectate();
    activity.allow_join_requests();

    activity.dispose();
    activity.dispose();

    assert_eq!(activity.party_id(), None);
    assert_eq!(activity.party_size(), 0);
    assert!(!activity.spectate_allowed());
    assert!(!activity.join_allowed());
}
