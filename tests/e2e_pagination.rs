//! E2E tests for cursor and window-slice pagination

mod common;

use std::sync::Arc;

use common::{FakePostApi, page, post, test_config};
use feedstore::FeedClient;
use feedstore::api::CollectionSource;
use feedstore::data::{FeedKind, Post, PostId, ProfileTab};
use feedstore::error::AppError;
use feedstore::service::LoadOutcome;

fn client(api: &Arc<FakePostApi>) -> FeedClient {
    FeedClient::with_api(test_config("http://localhost/api/"), api.clone())
}

fn posts(range: std::ops::RangeInclusive<u64>) -> Vec<Post> {
    range.map(|id| post(id.to_string(), "bob", 0)).collect()
}

#[tokio::test]
async fn test_cursor_stops_after_last_page() {
    let api = FakePostApi::new();
    api.set_page(1, Ok(page(posts(1..=10), true)));
    api.set_page(2, Ok(page(posts(11..=15), false)));
    let client = client(&api);
    let feed = client.feed_pager(client.feed_query(FeedKind::Home));

    assert_eq!(feed.load_more().await, LoadOutcome::Loaded { added: 10 });
    assert_eq!(feed.load_more().await, LoadOutcome::Loaded { added: 5 });
    assert_eq!(feed.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(feed.load_more().await, LoadOutcome::Exhausted);

    assert_eq!(api.feed_calls(), 2);
    assert_eq!(feed.window().items.len(), 15);
}

#[tokio::test]
async fn test_concurrent_load_more_is_single_flight() {
    let api = FakePostApi::new();
    api.set_page(1, Ok(page(posts(1..=10), true)));
    let client = client(&api);
    let feed = client.feed_pager(client.feed_query(FeedKind::Explore));

    let (first, second) = tokio::join!(feed.load_more(), feed.load_more());

    assert_eq!(first, LoadOutcome::Loaded { added: 10 });
    assert_eq!(second, LoadOutcome::Busy);
    assert_eq!(api.feed_calls(), 1);
}

#[tokio::test]
async fn test_failed_page_keeps_items_and_stops_paging() {
    let api = FakePostApi::new();
    api.set_page(1, Ok(page(posts(1..=10), true)));
    api.set_page(2, Err(AppError::Server { status: 503 }));
    let client = client(&api);
    let mut notifications = client.notifier.subscribe();
    let feed = client.feed_pager(client.feed_query(FeedKind::Home));

    feed.load_more().await;
    assert_eq!(feed.load_more().await, LoadOutcome::Failed);

    // one attempt plus two retries
    assert_eq!(api.feed_calls(), 4);
    let window = feed.window();
    assert_eq!(window.items.len(), 10);
    assert!(!window.has_more);
    assert!(!window.loading);
    assert!(!notifications.recv().await.unwrap().message.is_empty());

    assert_eq!(feed.load_more().await, LoadOutcome::Exhausted);
    assert_eq!(api.feed_calls(), 4);
}

#[tokio::test]
async fn test_refresh_failure_does_not_clear_items() {
    let api = FakePostApi::new();
    api.set_page(1, Ok(page(posts(1..=3), false)));
    let client = client(&api);
    let feed = client.feed_pager(client.feed_query(FeedKind::Home));
    feed.load_more().await;

    api.set_page(1, Err(AppError::Validation("nope".to_string())));
    assert_eq!(feed.refresh().await, LoadOutcome::Failed);
    assert_eq!(feed.window().items.len(), 3);

    api.set_page(1, Ok(page(posts(7..=8), true)));
    assert_eq!(feed.refresh().await, LoadOutcome::Loaded { added: 2 });
    let window = feed.window();
    assert_eq!(window.items.len(), 2);
    assert_eq!(window.items[0].id, PostId::from("7"));
    assert_eq!(window.page, 2);
}

#[tokio::test]
async fn test_reset_discards_in_flight_page() {
    let api = FakePostApi::new();
    api.set_page(1, Ok(page(posts(1..=5), true)));
    let client = client(&api);
    let feed = client.feed_pager(client.feed_query(FeedKind::Home));

    let (outcome, ()) = tokio::join!(feed.load_more(), async { feed.reset() });

    assert_eq!(outcome, LoadOutcome::Superseded);
    let window = feed.window();
    assert!(window.items.is_empty());
    assert_eq!(window.page, 1);
    assert!(!window.loading);
}

#[tokio::test]
async fn test_profile_windows_need_one_fetch() {
    let api = FakePostApi::new();
    let source = CollectionSource::profile("bob", ProfileTab::Media);
    api.set_collection(source, posts(1..=50));
    let client = client(&api);
    let tab = client.profile_tab("bob", ProfileTab::Media);

    let mut outcomes = Vec::new();
    while tab.has_more() {
        outcomes.push(tab.load_more().await);
    }

    assert_eq!(
        outcomes,
        vec![
            LoadOutcome::Loaded { added: 20 },
            LoadOutcome::Loaded { added: 20 },
            LoadOutcome::Loaded { added: 10 },
        ]
    );
    assert_eq!(api.collection_calls(), 1);
    assert_eq!(api.feed_calls(), 0);
    assert_eq!(tab.window().items.len(), 50);
}

#[tokio::test]
async fn test_switching_tab_refetches() {
    let api = FakePostApi::new();
    api.set_collection(
        CollectionSource::profile("bob", ProfileTab::Posts),
        posts(1..=5),
    );
    api.set_collection(
        CollectionSource::profile("bob", ProfileTab::Replies),
        posts(6..=7),
    );
    let client = client(&api);
    let tab = client.profile_tab("bob", ProfileTab::Posts);
    tab.load_more().await;

    tab.open(CollectionSource::profile("bob", ProfileTab::Replies));
    assert_eq!(tab.load_more().await, LoadOutcome::Loaded { added: 2 });
    assert_eq!(api.collection_calls(), 2);
    assert_eq!(tab.window().items[0].id, PostId::from("6"));
}

#[tokio::test]
async fn test_switch_during_fetch_discards_old_collection() {
    let api = FakePostApi::new();
    api.set_collection(
        CollectionSource::profile("bob", ProfileTab::Posts),
        posts(1..=5),
    );
    let client = client(&api);
    let tab = client.profile_tab("bob", ProfileTab::Posts);

    let (outcome, ()) = tokio::join!(tab.load_more(), async {
        tab.open(CollectionSource::profile("carol", ProfileTab::Posts));
    });

    assert_eq!(outcome, LoadOutcome::Superseded);
    let window = tab.window();
    assert!(window.items.is_empty());
    assert_eq!(window.total, None);
}

#[tokio::test]
async fn test_later_windows_reflect_mutations_made_meanwhile() {
    let api = FakePostApi::new();
    api.set_collection(CollectionSource::Bookmarks, posts(1..=30));
    let client = client(&api);
    let bookmarks = client.bookmarks();
    bookmarks.load_more().await;

    // post 25 is cached but not yet served
    client.mutations.like(&PostId::from("25")).await.unwrap();
    bookmarks.load_more().await;

    let items = bookmarks.window().items;
    let liked = items
        .iter()
        .find(|item| item.id == PostId::from("25"))
        .unwrap();
    assert!(liked.flags.is_liked);
    assert_eq!(liked.counts.likes, 1);
}
