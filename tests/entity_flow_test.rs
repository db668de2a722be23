// Integration tests for lazy entity expansion and collection paging

use mockito::Server;
use unisocial::{
    AuthEngine, Connection, Entity, EntityRoute, OAuth2Engine, Params, ProviderProfile, Value,
};

fn profile(base: &str) -> ProviderProfile {
    ProviderProfile::new("example", base)
        .with_token_param("access_token")
        .with_id_fields(["id", "id_str"])
        .with_list_field("users")
        .with_cursor("next_cursor", "cursor")
        .with_terminal_cursor("0")
        .with_field_type("user", "user")
        .with_field_type("status", "tweet")
        .with_route("user", EntityRoute::with_param("users/show.json", "user_id"))
}

fn connection(base: &str) -> Connection {
    let mut engine = OAuth2Engine::new("app-id", "app-secret");
    engine.set_token("tok".to_string(), None, None);
    Connection::with_http(profile(base), AuthEngine::OAuth2(engine))
}

#[tokio::test]
async fn test_autoexpanding_stub_fetches_exactly_once() {
    let mut server = Server::new_async().await;
    let connection = connection(&server.url());

    let show = server
        .mock("GET", "/users/show.json?user_id=12&access_token=tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": 12, "id_str": "12", "screen_name": "martha", "followers_count": 7}"#)
        .expect(1)
        .create_async()
        .await;

    let mut user = connection.autoexpanding_stub("user", 12_u64);
    assert!(user.is_stub());
    assert!(user.property("screen_name").is_none());

    // The first missing-field access triggers the one fetch.
    let name = user
        .get("screen_name")
        .await
        .unwrap()
        .and_then(Value::as_str)
        .map(str::to_string);
    assert_eq!(name.as_deref(), Some("martha"));
    assert!(!user.is_stub());

    // Later access, present or missing, stays local.
    let followers = user
        .get("followers_count")
        .await
        .unwrap()
        .and_then(Value::as_i64);
    assert_eq!(followers, Some(7));
    assert!(user.get("verified").await.unwrap().is_none());
    show.assert_async().await;
}

#[tokio::test]
async fn test_plain_stub_never_touches_the_network() {
    let mut server = Server::new_async().await;
    let connection = connection(&server.url());

    let show = server
        .mock("GET", "/users/show.json?user_id=12&access_token=tok")
        .with_status(200)
        .with_body("{}")
        .expect(0)
        .create_async()
        .await;

    let mut user = connection.stub("user", 12_u64);
    assert!(user.get("screen_name").await.unwrap().is_none());
    assert!(user.is_stub());
    show.assert_async().await;
}

#[tokio::test]
async fn test_collection_pages_carry_the_original_parameters_forward() {
    let mut server = Server::new_async().await;
    let connection = connection(&server.url());

    let first = server
        .mock("GET", "/friends/list.json?screen_name=martha&access_token=tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"users": [{"id": 1}, {"id": 2}], "next_cursor": 1301}"#)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/friends/list.json?screen_name=martha&cursor=1301&access_token=tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"users": [{"id": 3}], "next_cursor": 0}"#)
        .create_async()
        .await;

    let mut params = Params::new();
    params.insert("screen_name".to_string(), "martha".to_string());
    let value = connection.fetch("friends/list.json", params).await.unwrap();
    first.assert_async().await;

    let mut listing = match value {
        Value::Collection(collection) => collection,
        other => panic!("expected a collection, got {other:?}"),
    };
    assert_eq!(listing.len(), 2);
    assert!(listing.has_more());

    let appended = listing.fetch_next().await.unwrap();
    assert_eq!(appended.len(), 1);
    second.assert_async().await;

    // The terminal cursor ends the listing; further calls stay local.
    assert!(!listing.has_more());
    assert!(listing.fetch_next().await.unwrap().is_empty());
    let ids: Vec<_> = listing.items().iter().filter_map(Entity::id).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_responses_convert_to_typed_values() {
    let mut server = Server::new_async().await;
    let connection = connection(&server.url());

    let _mock = server
        .mock("GET", "/statuses/show.json?id=99&access_token=tok")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "id": 99,
                "text": "hello",
                "created_at": "2014-09-21T12:00:00",
                "user": {"id": 12, "screen_name": "martha"}
            }"#,
        )
        .create_async()
        .await;

    let mut params = Params::new();
    params.insert("id".to_string(), "99".to_string());
    let value = connection
        .fetch("statuses/show.json", params)
        .await
        .unwrap();

    let status = value.as_entity().expect("entity");
    assert!(matches!(
        status.property("created_at"),
        Some(Value::DateTime(_))
    ));
    let author = status
        .property("user")
        .and_then(Value::as_entity)
        .expect("author entity");
    assert_eq!(author.type_tag(), Some("user"));
    assert_eq!(author.id().as_deref(), Some("12"));
}
