use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// One inventory record, keyed by its `productId` field.
pub(crate) type Item = serde_json::Map<String, Value>;

/// Opaque resume point for a table scan. Absent on request means "start from
/// the beginning"; absent on response means "no more pages".
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScanCursor(pub(crate) HashMap<String, AttributeValue>);

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("scan did not finish within {0} pages")]
    ScanTimeout(usize),
}

/// Item-level operations of the backing key-value store.
#[async_trait]
pub(crate) trait ProductStore: Send + Sync {
    /// Fetch one item by key. `None` if the key does not exist.
    async fn get(&self, product_id: &str) -> Result<Option<Item>, StoreError>;

    /// Write an item, replacing any existing item with the same key.
    async fn put(&self, item: Item) -> Result<(), StoreError>;

    /// Set a single field on an existing item and return the post-update
    /// value of the changed fields.
    async fn update(
        &self,
        product_id: &str,
        field: &str,
        value: Value,
    ) -> Result<Option<Item>, StoreError>;

    /// Remove an item and return it. `None` if the key did not exist.
    async fn delete(&self, product_id: &str) -> Result<Option<Item>, StoreError>;

    /// Fetch one page of a full-table scan, resuming from `cursor`.
    async fn scan_page(
        &self,
        cursor: Option<ScanCursor>,
    ) -> Result<(Vec<Item>, Option<ScanCursor>), StoreError>;
}

/// Drains a paginated scan into one ordered sequence, following the cursor
/// until the store reports no more pages. Items keep the store-returned
/// order within and across pages. Fails with [`StoreError::ScanTimeout`]
/// rather than looping once `max_pages` pages have been fetched without the
/// cursor running out.
pub(crate) async fn scan_all<S>(store: &S, max_pages: usize) -> Result<Vec<Item>, StoreError>
where
    S: ProductStore + ?Sized,
{
    let mut items = Vec::new();
    let mut cursor = None;

    for _ in 0..max_pages {
        let (page, next) = store.scan_page(cursor.take()).await?;
        items.extend(page);
        match next {
            Some(c) => cursor = Some(c),
            None => return Ok(items),
        }
    }

    Err(StoreError::ScanTimeout(max_pages))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn item(id: &str) -> Item {
        match json!({ "productId": id }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn cursor_for(page: usize) -> ScanCursor {
        let mut key = HashMap::new();
        key.insert(
            "productId".to_string(),
            AttributeValue::S(format!("page-{page}")),
        );
        ScanCursor(key)
    }

    /// Serves a fixed sequence of pages, encoding the next page index in the
    /// cursor, and counts how often `scan_page` is called.
    struct PagedStore {
        pages: Vec<Vec<Item>>,
        calls: AtomicUsize,
    }

    impl PagedStore {
        fn new(pages: Vec<Vec<Item>>) -> Self {
            Self {
                pages,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductStore for PagedStore {
        async fn get(&self, _product_id: &str) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn put(&self, _item: Item) -> Result<(), StoreError> {
            unreachable!("scan-only fake")
        }

        async fn update(
            &self,
            _product_id: &str,
            _field: &str,
            _value: Value,
        ) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn delete(&self, _product_id: &str) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn scan_page(
            &self,
            cursor: Option<ScanCursor>,
        ) -> Result<(Vec<Item>, Option<ScanCursor>), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index = match cursor {
                None => 0,
                Some(c) => match c.0.get("productId") {
                    Some(AttributeValue::S(s)) => s
                        .strip_prefix("page-")
                        .and_then(|n| n.parse().ok())
                        .expect("well-formed test cursor"),
                    _ => panic!("unexpected cursor shape"),
                },
            };
            let page = self.pages.get(index).cloned().unwrap_or_default();
            let next = if index + 1 < self.pages.len() {
                Some(cursor_for(index + 1))
            } else {
                None
            };
            Ok((page, next))
        }
    }

    /// Always hands back a cursor; a correct accumulator must give up.
    struct EndlessStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProductStore for EndlessStore {
        async fn get(&self, _product_id: &str) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn put(&self, _item: Item) -> Result<(), StoreError> {
            unreachable!("scan-only fake")
        }

        async fn update(
            &self,
            _product_id: &str,
            _field: &str,
            _value: Value,
        ) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn delete(&self, _product_id: &str) -> Result<Option<Item>, StoreError> {
            unreachable!("scan-only fake")
        }

        async fn scan_page(
            &self,
            _cursor: Option<ScanCursor>,
        ) -> Result<(Vec<Item>, Option<ScanCursor>), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((vec![item("again")], Some(cursor_for(0))))
        }
    }

    #[tokio::test]
    async fn concatenates_pages_in_order() {
        let store = PagedStore::new(vec![
            vec![item("a"), item("b")],
            vec![item("c")],
            vec![item("d"), item("e")],
        ]);

        let all = scan_all(&store, 10).await.unwrap();

        let ids: Vec<&str> = all
            .iter()
            .map(|i| i.get("productId").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn empty_table_yields_empty_sequence() {
        let store = PagedStore::new(vec![vec![]]);

        let all = scan_all(&store, 10).await.unwrap();

        assert!(all.is_empty());
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn empty_intermediate_pages_are_skipped_not_dropped() {
        let store = PagedStore::new(vec![vec![item("a")], vec![], vec![item("b")]]);

        let all = scan_all(&store, 10).await.unwrap();

        assert_eq!(all.len(), 2);
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_page_bound() {
        let store = EndlessStore {
            calls: AtomicUsize::new(0),
        };

        let err = scan_all(&store, 5).await.unwrap_err();

        assert!(matches!(err, StoreError::ScanTimeout(5)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 5);
    }
}
