use super::*;
use chrono::Duration;

#[test]
fn test_credential_roundtrips_through_store_json() {
    let store = MemoryCredentialStore::new();

    let credential = AccessCredential::OAuth1 {
        token: "tok".to_string(),
        secret: "sec".to_string(),
    };
    save_credential(&store, "twitter", &credential).unwrap();
    let loaded = load_credential(&store, "twitter").unwrap();
    assert_eq!(loaded, Some(credential));

    let credential = AccessCredential::OAuth2 {
        access_token: "bearer".to_string(),
        refresh_token: Some("refresh".to_string()),
        expires_at: None,
    };
    save_credential(&store, "facebook", &credential).unwrap();
    let loaded = load_credential(&store, "facebook").unwrap();
    assert_eq!(loaded, Some(credential));

    assert_eq!(load_credential(&store, "google").unwrap(), None);
}

#[test]
fn test_corrupt_stored_credential_is_a_configuration_error() {
    let store = MemoryCredentialStore::new();
    store.set(&access_key("twitter"), "not json".to_string());
    assert!(matches!(
        load_credential(&store, "twitter"),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_store_keys_are_provider_scoped() {
    assert_eq!(access_key("twitter"), "twitter:access");
    assert_eq!(request_token_key("twitter"), "twitter:request_token");
    assert_eq!(state_key("facebook"), "facebook:state");
}

#[test]
fn test_oauth1_credentials_never_expire() {
    let credential = AccessCredential::OAuth1 {
        token: "t".to_string(),
        secret: "s".to_string(),
    };
    assert!(!credential.is_expired(0));
    assert!(!credential.is_expired(i64::MAX / 4));
}

#[test]
fn test_oauth2_expiry_margin() {
    let credential = AccessCredential::OAuth2 {
        access_token: "t".to_string(),
        refresh_token: None,
        expires_at: Some(Utc::now() + Duration::seconds(60)),
    };
    assert!(!credential.is_expired(5));
    assert!(credential.is_expired(120));

    let open_ended = AccessCredential::OAuth2 {
        access_token: "t".to_string(),
        refresh_token: None,
        expires_at: None,
    };
    assert!(!open_ended.is_expired(i64::MAX / 4));
}

#[test]
fn test_engine_rejects_credential_kind_mismatch() {
    let mut engine = AuthEngine::OAuth1(oauth1::OAuth1Engine::new("k", "s"));
    let result = engine.set_credential(AccessCredential::OAuth2 {
        access_token: "t".to_string(),
        refresh_token: None,
        expires_at: None,
    });
    assert!(matches!(result, Err(Error::Configuration(_))));

    let mut engine = AuthEngine::OAuth2(oauth2::OAuth2Engine::new("id", "secret"));
    let result = engine.set_credential(AccessCredential::OAuth1 {
        token: "t".to_string(),
        secret: "s".to_string(),
    });
    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn test_engine_auth_state_tracks_credential() {
    let mut engine = AuthEngine::OAuth1(oauth1::OAuth1Engine::new("k", "s"));
    assert!(!engine.is_auth());
    assert!(engine.credential().is_none());

    let credential = AccessCredential::OAuth1 {
        token: "tok".to_string(),
        secret: "sec".to_string(),
    };
    engine.set_credential(credential.clone()).unwrap();
    assert!(engine.is_auth());
    assert_eq!(engine.credential(), Some(credential));

    engine.clear_credential();
    assert!(!engine.is_auth());
}

#[test]
fn test_engine_oauth2_auth_requires_unexpired_token() {
    let mut engine = AuthEngine::OAuth2(oauth2::OAuth2Engine::new("id", "secret"));
    engine
        .set_credential(AccessCredential::OAuth2 {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() - Duration::seconds(1)),
        })
        .unwrap();
    assert!(!engine.is_auth());

    engine
        .set_credential(AccessCredential::OAuth2 {
            access_token: "t".to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + Duration::seconds(3600)),
        })
        .unwrap();
    assert!(engine.is_auth());
}
