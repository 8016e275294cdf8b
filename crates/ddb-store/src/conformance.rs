//! Behavioural checks every [`Store`] backend must pass.
//!
//! Each backend's test module calls these with a fresh store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::StoreError;
use crate::traits::{update, view, BucketRef, Store};

const NS: &[u8] = b"orders";
const ITEMS: BucketRef<'static> = BucketRef::new(NS, b"items");
const META: BucketRef<'static> = BucketRef::new(NS, b"meta");

fn prepare(store: &dyn Store) {
    update(store, |txn| -> Result<(), StoreError> {
        txn.create_namespace(NS)?;
        txn.create_bucket(ITEMS)?;
        txn.create_bucket(META)?;
        Ok(())
    })
    .unwrap();
}

pub(crate) fn basic_crud(store: &dyn Store) {
    prepare(store);

    let mut txn = store.begin_write().unwrap();
    txn.put(ITEMS, b"k1", b"one").unwrap();
    txn.put(ITEMS, b"k2", b"two").unwrap();
    txn.put(ITEMS, b"k1", b"uno").unwrap();
    assert_eq!(txn.get(ITEMS, b"k1").unwrap(), Some(b"uno".to_vec()));
    assert!(txn.delete(ITEMS, b"k2").unwrap());
    assert!(!txn.delete(ITEMS, b"k2").unwrap());
    txn.put(ITEMS, b"empty", b"").unwrap();
    txn.commit().unwrap();

    let txn = store.begin_read().unwrap();
    assert_eq!(txn.get(ITEMS, b"k1").unwrap(), Some(b"uno".to_vec()));
    assert_eq!(txn.get(ITEMS, b"k2").unwrap(), None);
    assert_eq!(txn.get(ITEMS, b"empty").unwrap(), Some(Vec::new()));
    assert_eq!(txn.count(ITEMS).unwrap(), 2);
    assert_eq!(txn.count(META).unwrap(), 0);
}

pub(crate) fn missing_buckets_are_errors(store: &dyn Store) {
    let txn = store.begin_read().unwrap();
    assert!(matches!(
        txn.get(ITEMS, b"k"),
        Err(StoreError::NamespaceNotFound(_))
    ));
    assert!(!txn.bucket_exists(ITEMS).unwrap());
    drop(txn);

    prepare(store);
    let missing = BucketRef::new(NS, b"nope");
    let mut txn = store.begin_write().unwrap();
    assert!(matches!(
        txn.put(missing, b"k", b"v"),
        Err(StoreError::BucketNotFound { .. })
    ));
    assert!(matches!(
        txn.count(missing),
        Err(StoreError::BucketNotFound { .. })
    ));
    assert!(matches!(
        txn.create_bucket(BucketRef::new(b"ghost", b"b")),
        Err(StoreError::NamespaceNotFound(_))
    ));
    assert!(matches!(
        txn.delete_namespace(b"ghost"),
        Err(StoreError::NamespaceNotFound(_))
    ));
    assert!(!txn.create_bucket(ITEMS).unwrap());
    assert!(!txn.create_namespace(NS).unwrap());
}

pub(crate) fn rollback_discards_changes(store: &dyn Store) {
    prepare(store);

    let mut txn = store.begin_write().unwrap();
    txn.put(ITEMS, b"k", b"v").unwrap();
    txn.create_namespace(b"scratch").unwrap();
    txn.rollback().unwrap();

    let txn = store.begin_read().unwrap();
    assert_eq!(txn.get(ITEMS, b"k").unwrap(), None);
    assert!(!txn.namespace_exists(b"scratch").unwrap());

    // A failing closure rolls back too.
    let result: Result<(), StoreError> = update(store, |txn| {
        txn.put(ITEMS, b"k", b"v")?;
        Err(StoreError::Config("boom".into()))
    });
    assert!(result.is_err());
    let value = view(store, |txn| txn.get(ITEMS, b"k")).unwrap();
    assert_eq!(value, None);
}

pub(crate) fn drop_without_commit_rolls_back(store: &dyn Store) {
    prepare(store);
    {
        let mut txn = store.begin_write().unwrap();
        txn.put(ITEMS, b"k", b"v").unwrap();
    }
    // The dropped writer must also have released admission.
    let txn = store.begin_write().unwrap();
    assert_eq!(txn.get(ITEMS, b"k").unwrap(), None);
}

pub(crate) fn commit_hooks_run_only_on_commit(store: &dyn Store) {
    prepare(store);
    let fired = Arc::new(AtomicUsize::new(0));

    let mut txn = store.begin_write().unwrap();
    let counter = Arc::clone(&fired);
    txn.on_commit(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    txn.rollback().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    let mut txn = store.begin_write().unwrap();
    let counter = Arc::clone(&fired);
    txn.on_commit(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    txn.put(ITEMS, b"k", b"v").unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    txn.commit().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

pub(crate) fn readers_see_committed_state_only(store: &dyn Store) {
    prepare(store);
    update(store, |txn| txn.put(ITEMS, b"k", b"old")).unwrap();

    let before = store.begin_read().unwrap();
    let mut writer = store.begin_write().unwrap();
    writer.put(ITEMS, b"k", b"new").unwrap();

    let during = store.begin_read().unwrap();
    assert_eq!(during.get(ITEMS, b"k").unwrap(), Some(b"old".to_vec()));
    drop(during);

    writer.commit().unwrap();
    assert_eq!(before.get(ITEMS, b"k").unwrap(), Some(b"old".to_vec()));
    drop(before);

    let after = store.begin_read().unwrap();
    assert_eq!(after.get(ITEMS, b"k").unwrap(), Some(b"new".to_vec()));
}

pub(crate) fn namespaces_are_independent(store: &dyn Store) {
    let a = BucketRef::new(b"a", b"data");
    let b = BucketRef::new(b"b", b"data");
    update(store, |txn| -> Result<(), StoreError> {
        txn.create_namespace(b"a")?;
        txn.create_namespace(b"b")?;
        txn.create_bucket(a)?;
        txn.create_bucket(b)?;
        txn.put(a, b"k", b"from-a")?;
        txn.put(b, b"k", b"from-b")?;
        Ok(())
    })
    .unwrap();

    let txn = store.begin_read().unwrap();
    assert_eq!(txn.get(a, b"k").unwrap(), Some(b"from-a".to_vec()));
    assert_eq!(txn.get(b, b"k").unwrap(), Some(b"from-b".to_vec()));
    assert_eq!(
        txn.list_namespaces().unwrap(),
        vec![b"a".to_vec(), b"b".to_vec()]
    );
}

pub(crate) fn delete_namespace_removes_everything(store: &dyn Store) {
    prepare(store);
    update(store, |txn| txn.put(ITEMS, b"k", b"v")).unwrap();

    update(store, |txn| txn.delete_namespace(NS)).unwrap();
    let txn = store.begin_read().unwrap();
    assert!(!txn.namespace_exists(NS).unwrap());
    assert!(!txn.bucket_exists(ITEMS).unwrap());
    drop(txn);

    // Recreating starts empty.
    prepare(store);
    let value = view(store, |txn| txn.get(ITEMS, b"k")).unwrap();
    assert_eq!(value, None);

    update(store, |txn| txn.put(META, b"m", b"v")).unwrap();
    assert!(update(store, |txn| txn.delete_bucket(META)).unwrap());
    assert!(!update(store, |txn| txn.delete_bucket(META)).unwrap());
}

pub(crate) fn seek_after_orders_by_bytes(store: &dyn Store) {
    prepare(store);
    update(store, |txn| -> Result<(), StoreError> {
        for key in [&b"b"[..], b"a", b"\xff\x00", b"\x00", b"ab"] {
            txn.put(ITEMS, key, key)?;
        }
        Ok(())
    })
    .unwrap();

    let txn = store.begin_read().unwrap();
    let keys: Vec<Vec<u8>> = txn
        .entries(ITEMS)
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(
        keys,
        vec![
            b"\x00".to_vec(),
            b"a".to_vec(),
            b"ab".to_vec(),
            b"b".to_vec(),
            b"\xff\x00".to_vec()
        ]
    );
    let (first, _) = txn.seek_after(ITEMS, None).unwrap().unwrap();
    assert_eq!(first, b"\x00".to_vec());
    let (next, _) = txn.seek_after(ITEMS, Some(b"aa")).unwrap().unwrap();
    assert_eq!(next, b"ab".to_vec());
    assert!(txn.seek_after(ITEMS, Some(b"\xff\x00")).unwrap().is_none());
}

pub(crate) fn writers_are_serialized(store: Arc<dyn Store>) {
    prepare(&*store);
    let first = store.begin_write().unwrap();
    let acquired = Arc::new(AtomicBool::new(false));

    let handle = {
        let store = Arc::clone(&store);
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            let mut txn = store.begin_write().unwrap();
            acquired.store(true, Ordering::SeqCst);
            txn.put(ITEMS, b"second", b"v").unwrap();
            txn.commit().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst));
    first.commit().unwrap();
    handle.join().expect("writer thread should not panic");

    assert!(acquired.load(Ordering::SeqCst));
    let value = view(&*store, |txn| txn.get(ITEMS, b"second")).unwrap();
    assert_eq!(value, Some(b"v".to_vec()));
}
