//! End-to-end document-layer behaviour over the in-memory engine.

use kane::{CancellationToken, Db, Document, Error, Filter};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
struct User {
    id: String,
    name: String,
    age: u32,
    nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
struct Todo {
    #[document(pk)]
    key: String,
    user_id: String,
    order: u64,
}

fn user(id: &str, name: &str, age: u32) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        age,
        nickname: None,
    }
}

fn todo(user_id: &str, order: u64) -> Todo {
    Todo {
        key: format!("{}:{}", user_id, order),
        user_id: user_id.to_string(),
        order,
    }
}

async fn open_db() -> (Db, CancellationToken) {
    let cancel = CancellationToken::new();
    let db = Db::connect(&cancel, "memory://").await.unwrap();
    (db, cancel)
}

/// Counts raw keys in one of the single-letter namespaces.
async fn count_namespace(db: &Db, prefix: u8) -> usize {
    let cancel = CancellationToken::new();
    let mut iter = db
        .engine()
        .iter_keys(&cancel, vec![prefix], Some(vec![prefix + 1]))
        .await
        .unwrap();
    let mut count = 0;
    while iter.next().await.unwrap().is_some() {
        count += 1;
    }
    count
}

#[tokio::test]
async fn should_get_document_back_by_indexed_field() {
    // given
    let (db, cancel) = open_db().await;
    db.put(&cancel, &user("bob", "Bob Baumeister", 255))
        .await
        .unwrap();

    // when
    let found: User = db.get(&cancel, &Filter::eq("age", 255u32)).await.unwrap();

    // then
    assert_eq!(found.name, "Bob Baumeister");
}

#[tokio::test]
async fn should_get_document_back_by_primary_key_field() {
    // given
    let (db, cancel) = open_db().await;
    db.put(&cancel, &user("bob", "Bob", 40)).await.unwrap();

    // when
    let found: User = db.get(&cancel, &Filter::eq("id", "bob")).await.unwrap();

    // then
    assert_eq!(found, user("bob", "Bob", 40));
}

#[tokio::test]
async fn should_leave_one_live_record_after_repeated_set() {
    // given
    let (db, cancel) = open_db().await;

    // when
    db.set(&cancel, &user("x", "X", 1)).await.unwrap();
    db.set(&cancel, &user("x", "X", 1)).await.unwrap();

    // then - one pointer, one object record reachable through it
    assert_eq!(count_namespace(&db, b'k').await, 1);
    assert_eq!(count_namespace(&db, b'o').await, 1);
    let found: User = db.get(&cancel, &Filter::eq("id", "x")).await.unwrap();
    assert_eq!(found.age, 1);
}

#[tokio::test]
async fn should_delete_idempotently() {
    // given
    let (db, cancel) = open_db().await;
    let doc = user("gone", "Gone", 9);
    db.put(&cancel, &doc).await.unwrap();

    // when - delete twice; the second is a no-op
    db.del(&cancel, &doc).await.unwrap();
    db.del(&cancel, &doc).await.unwrap();

    // then
    let result: Result<User, _> = db.get(&cancel, &Filter::eq("id", "gone")).await;
    assert_eq!(result.unwrap_err(), Error::NotFound);
    assert_eq!(count_namespace(&db, b'k').await, 0);
    assert_eq!(count_namespace(&db, b'o').await, 0);
    assert_eq!(count_namespace(&db, b'f').await, 0);
}

#[tokio::test]
async fn should_reject_put_over_live_primary_key() {
    // given
    let (db, cancel) = open_db().await;
    db.put(&cancel, &user("bob", "Original", 30)).await.unwrap();

    // when
    let result = db.put(&cancel, &user("bob", "Duplicate", 31)).await;

    // then - conflict, original untouched, no leaked version
    assert!(matches!(result, Err(Error::Conflict(_))));
    let found: User = db.get(&cancel, &Filter::eq("id", "bob")).await.unwrap();
    assert_eq!(found.name, "Original");
    assert_eq!(count_namespace(&db, b'o').await, 1);
    assert_eq!(count_namespace(&db, b'k').await, 1);
}

#[tokio::test]
async fn should_cover_every_walked_field_with_an_index_entry() {
    // given
    let (db, cancel) = open_db().await;
    let doc = User {
        id: "bob".into(),
        name: "Bob".into(),
        age: 42,
        nickname: Some("bobby".into()),
    };
    db.set(&cancel, &doc).await.unwrap();

    // then - every field finds the document back
    let by_id: Vec<User> = db
        .iter(&cancel, &Filter::eq("id", "bob"))
        .await
        .collect()
        .await
        .unwrap();
    let by_name: Vec<User> = db
        .iter(&cancel, &Filter::eq("name", "Bob"))
        .await
        .collect()
        .await
        .unwrap();
    let by_age: Vec<User> = db
        .iter(&cancel, &Filter::eq("age", 42u32))
        .await
        .collect()
        .await
        .unwrap();
    let by_nickname: Vec<User> = db
        .iter(&cancel, &Filter::eq("nickname", "bobby"))
        .await
        .collect()
        .await
        .unwrap();
    assert_eq!(by_id, vec![doc.clone()]);
    assert_eq!(by_name, vec![doc.clone()]);
    assert_eq!(by_age, vec![doc.clone()]);
    assert_eq!(by_nickname, vec![doc]);
}

#[tokio::test]
async fn should_purge_index_entries_on_delete() {
    // given
    let (db, cancel) = open_db().await;
    let doc = user("bob", "Bob", 33);
    db.set(&cancel, &doc).await.unwrap();

    // when
    db.del(&cancel, &doc).await.unwrap();

    // then
    let by_age: Vec<User> = db
        .iter(&cancel, &Filter::eq("age", 33u32))
        .await
        .collect()
        .await
        .unwrap();
    assert!(by_age.is_empty());
    assert_eq!(count_namespace(&db, b'f').await, 0);
}

#[tokio::test]
async fn should_replace_index_entries_when_value_changes() {
    // given
    let (db, cancel) = open_db().await;
    db.set(&cancel, &user("x", "X", 10)).await.unwrap();

    // when
    db.set(&cancel, &user("x", "X", 20)).await.unwrap();

    // then - the old value no longer matches, the new one does exactly once
    let at_ten: Vec<User> = db
        .iter(&cancel, &Filter::eq("age", 10u32))
        .await
        .collect()
        .await
        .unwrap();
    let at_twenty: Vec<User> = db
        .iter(&cancel, &Filter::eq("age", 20u32))
        .await
        .collect()
        .await
        .unwrap();
    assert!(at_ten.is_empty());
    assert_eq!(at_twenty.len(), 1);
}

#[tokio::test]
async fn should_yield_only_documents_having_the_field() {
    // given - one user with a nickname, one without
    let (db, cancel) = open_db().await;
    let with = User {
        id: "a".into(),
        name: "A".into(),
        age: 1,
        nickname: Some("ace".into()),
    };
    db.set(&cancel, &with).await.unwrap();
    db.set(&cancel, &user("b", "B", 2)).await.unwrap();

    // when
    let having: Vec<User> = db
        .iter(&cancel, &Filter::has("nickname"))
        .await
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(having, vec![with]);
}

#[tokio::test]
async fn should_iterate_only_matching_documents() {
    // given - three bob todos plus near-miss user ids
    let (db, cancel) = open_db().await;
    for doc in [
        todo("bob", 1),
        todo("bob", 2),
        todo("bob", 6666666),
        todo("bobi", 1),
        todo("boc", 1),
    ] {
        db.put(&cancel, &doc).await.unwrap();
    }

    // when
    let mut bobs: Vec<Todo> = db
        .iter(&cancel, &Filter::eq("user_id", "bob"))
        .await
        .collect()
        .await
        .unwrap();
    bobs.sort_by_key(|t| t.order);

    // then
    assert_eq!(bobs.len(), 3);
    assert_eq!(
        bobs.iter().map(|t| t.order).collect::<Vec<_>>(),
        vec![1, 2, 6666666]
    );
}

#[tokio::test]
async fn should_keep_remaining_documents_after_partial_delete() {
    // given
    let (db, cancel) = open_db().await;
    for doc in [
        todo("bob", 1),
        todo("bob", 2),
        todo("bob", 6666666),
        todo("bobi", 1),
        todo("boc", 1),
    ] {
        db.put(&cancel, &doc).await.unwrap();
    }

    // when
    db.del(&cancel, &todo("bob", 1)).await.unwrap();
    db.del(&cancel, &todo("bob", 2)).await.unwrap();

    // then
    let bobs: Vec<Todo> = db
        .iter(&cancel, &Filter::eq("user_id", "bob"))
        .await
        .collect()
        .await
        .unwrap();
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].order, 6666666);
}

#[tokio::test]
async fn should_surface_one_error_for_invalid_filter_then_terminate() {
    // given
    let (db, cancel) = open_db().await;
    db.set(&cancel, &user("bob", "Bob", 1)).await.unwrap();

    // when - the field name carries the structural separator
    let mut iter = db
        .iter::<User>(&cancel, &Filter::eq(b"Invalid\xff".as_slice(), "v"))
        .await;

    // then - exactly one error item, then the iteration is over
    assert!(matches!(iter.next().await, Err(Error::InvalidInput(_))));
    assert_eq!(iter.next().await.unwrap(), None);
}

#[tokio::test]
async fn should_return_displaced_document_from_swap() {
    // given
    let (db, cancel) = open_db().await;
    db.put(&cancel, &user("bob", "Before", 1)).await.unwrap();

    // when
    let old = db.swap(&cancel, &user("bob", "After", 2)).await.unwrap();

    // then
    assert_eq!(old, Some(user("bob", "Before", 1)));
    let found: User = db.get(&cancel, &Filter::eq("id", "bob")).await.unwrap();
    assert_eq!(found.name, "After");
}

#[tokio::test]
async fn should_return_none_from_swap_when_nothing_was_live() {
    // given
    let (db, cancel) = open_db().await;

    // when
    let old = db.swap(&cancel, &user("new", "New", 1)).await.unwrap();

    // then
    assert_eq!(old, None);
}

#[tokio::test]
async fn should_index_array_elements_under_the_same_path() {
    // given
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
    struct Post {
        id: String,
        tags: Vec<String>,
    }

    let (db, cancel) = open_db().await;
    let doc = Post {
        id: "post-1".into(),
        tags: vec!["rust".into(), "storage".into()],
    };
    db.set(&cancel, &doc).await.unwrap();

    // then - each element answers an equality lookup
    let by_first: Vec<Post> = db
        .iter(&cancel, &Filter::eq("tags", "rust"))
        .await
        .collect()
        .await
        .unwrap();
    let by_second: Vec<Post> = db
        .iter(&cancel, &Filter::eq("tags", "storage"))
        .await
        .collect()
        .await
        .unwrap();
    assert_eq!(by_first, vec![doc.clone()]);
    assert_eq!(by_second, vec![doc]);
}

#[tokio::test]
async fn should_reach_nested_fields_through_dotted_paths() {
    // given
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
    struct Order {
        id: String,
        shipping: Address,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Address {
        city: String,
    }

    let (db, cancel) = open_db().await;
    let doc = Order {
        id: "order-1".into(),
        shipping: Address {
            city: "Berlin".into(),
        },
    };
    db.set(&cancel, &doc).await.unwrap();

    // when
    let found: Vec<Order> = db
        .iter(&cancel, &Filter::eq("shipping.city", "Berlin"))
        .await
        .collect()
        .await
        .unwrap();

    // then
    assert_eq!(found, vec![doc]);
}

#[tokio::test]
async fn should_fail_with_cancelled_when_token_already_fired() {
    // given
    let (db, _) = open_db().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    // when
    let result = db.put(&cancel, &user("bob", "Bob", 1)).await;

    // then
    assert_eq!(result.unwrap_err(), Error::Cancelled);
}

#[tokio::test]
async fn should_reject_primary_key_that_is_too_short() {
    // given
    let (db, cancel) = open_db().await;

    // when - "b" encodes to two bytes, below the minimum of three
    let result = db.put(&cancel, &user("b", "Tiny", 1)).await;

    // then
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}
