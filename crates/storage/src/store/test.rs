use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use futures::future::{Ready, ready};

use super::Store;

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn() -> Ready<usize> + Send + Sync + 'static {
    let counter = counter.clone();
    move || ready(counter.fetch_add(1, Ordering::SeqCst) + 1)
}

fn keep_all(_: &usize) -> bool { true }

fn keep_odd(value: &usize) -> bool { value % 2 == 1 }

#[tokio::test]
async fn set_stores_value_and_closure() {
    let store = Store::<&str, usize>::new(4);
    let counter = Arc::new(AtomicUsize::new(0));

    assert!(!store.has(&"a"));
    assert_eq!(store.set("a", counting(&counter), keep_all).await, 1);

    assert!(store.has(&"a"));
    assert_eq!(store.read(&"a"), Some(1));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_set_is_never_stored() {
    let store = Store::<&str, usize>::new(4);

    assert_eq!(store.set("a", || async { 2 }, keep_odd).await, 2);

    assert!(!store.has(&"a"));
    assert_eq!(store.read(&"a"), None);
    assert!(store.is_empty());
}

#[tokio::test]
async fn reset_reruns_stored_closure() {
    let store = Store::<&str, usize>::new(4);
    let counter = Arc::new(AtomicUsize::new(0));

    store.set("a", counting(&counter), keep_all).await;

    assert_eq!(store.reset(&"a", keep_all).await, Some(2));
    assert_eq!(store.read(&"a"), Some(2));
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejected_reset_removes_entry() {
    let store = Store::<&str, usize>::new(4);
    let counter = Arc::new(AtomicUsize::new(0));

    store.set("a", counting(&counter), keep_odd).await;

    // the second run yields 2, which is rejected
    assert_eq!(store.reset(&"a", keep_odd).await, Some(2));
    assert!(!store.has(&"a"));
    assert_eq!(store.reset(&"a", keep_odd).await, None);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn reset_unknown_is_not_found() {
    let store = Store::<&str, usize>::new(4);

    assert_eq!(store.reset(&"missing", keep_all).await, None);
    assert!(!store.has(&"missing"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_of_entry_removed_mid_run_is_discarded() {
    let store = Arc::new(Store::<&str, usize>::new(4));

    store
        .set(
            "a",
            || async {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                7
            },
            keep_all,
        )
        .await;

    let reset = {
        let store = store.clone();
        tokio::spawn(async move { store.reset(&"a", keep_all).await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    store.remove(&"a");

    assert_eq!(reset.await.unwrap(), None);
    assert!(!store.has(&"a"));
}

#[tokio::test]
async fn remove_drops_value_and_closure() {
    let store = Store::<&str, usize>::new(1);
    let counter = Arc::new(AtomicUsize::new(0));

    store.set("a", counting(&counter), keep_all).await;
    store.remove(&"a");
    store.remove(&"a");

    assert!(!store.has(&"a"));
    assert_eq!(store.read(&"a"), None);
    assert_eq!(store.reset(&"a", keep_all).await, None);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn keys_lists_every_entry() {
    let store = Store::<&str, usize>::new(2);

    store.set("a", || async { 1 }, keep_all).await;
    store.set("b", || async { 2 }, keep_all).await;

    let mut keys = store.keys();
    keys.sort_unstable();

    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(store.len(), 2);
}
