//! Storage Module Tests
//!
//! Runs every operation against a real RocksDB instance in a temporary directory.
//!
//! ## Test Scopes
//! - **Key operations**: get/put/remove round trips on the default and named families.
//! - **Batches**: multi-get ordering, multi-remove, put-all and half-open range deletes.
//! - **Administration**: creating, listing and dropping column families.
//! - **Durability**: data survives close and reopen.

#[cfg(test)]
mod tests {
    use crate::error::StorageError;
    use crate::storage::persist::flush_each;
    use crate::storage::{DEFAULT_COLUMN_FAMILY, PersistStorage};
    use tempfile::TempDir;

    fn open_store(families: &[&str]) -> (TempDir, PersistStorage) {
        let dir = TempDir::new().unwrap();
        let store = PersistStorage::open(dir.path(), families).unwrap();
        (dir, store)
    }

    // ============================================================
    // KEY OPERATIONS
    // ============================================================

    #[test]
    fn test_put_get_remove_default_family() {
        // ARRANGE
        let (_dir, store) = open_store(&[]);

        // ACT
        store.put(b"order:1", b"pending").unwrap();

        // ASSERT
        assert_eq!(store.get(b"order:1").unwrap(), Some(b"pending".to_vec()));
        assert!(store.contains_key(b"order:1").unwrap());

        store.remove(b"order:1").unwrap();
        assert_eq!(store.get(b"order:1").unwrap(), None);
        assert!(!store.contains_key(b"order:1").unwrap());
    }

    #[test]
    fn test_put_overwrites_value() {
        let (_dir, store) = open_store(&[]);

        store.put(b"k", b"v1").unwrap();
        store.put(b"k", b"v2").unwrap();

        assert_eq!(store.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_named_families_are_isolated() {
        // ARRANGE
        let (_dir, store) = open_store(&["sessions"]);

        // ACT
        store.put_cf("sessions", b"k", b"session").unwrap();
        store.put(b"k", b"default").unwrap();

        // ASSERT
        assert_eq!(store.get_cf("sessions", b"k").unwrap(), Some(b"session".to_vec()));
        assert_eq!(store.get(b"k").unwrap(), Some(b"default".to_vec()));

        store.remove_cf("sessions", b"k").unwrap();
        assert_eq!(store.get_cf("sessions", b"k").unwrap(), None);
        assert_eq!(store.get(b"k").unwrap(), Some(b"default".to_vec()));
    }

    #[test]
    fn test_unknown_family_is_an_error() {
        let (_dir, store) = open_store(&[]);

        let result = store.get_cf("missing", b"k");

        assert!(matches!(result, Err(StorageError::MissingColumnFamily(name)) if name == "missing"));
    }

    // ============================================================
    // BATCH OPERATIONS
    // ============================================================

    #[test]
    fn test_multi_get_preserves_order_and_gaps() {
        let (_dir, store) = open_store(&[]);
        store.put(b"a", b"1").unwrap();
        store.put(b"c", b"3").unwrap();

        let values = store.multi_get(&[b"c".as_slice(), b"b".as_slice(), b"a".as_slice()]).unwrap();

        assert_eq!(values, vec![Some(b"3".to_vec()), None, Some(b"1".to_vec())]);
    }

    #[test]
    fn test_multi_remove_deletes_all_keys() {
        // ARRANGE
        let (_dir, store) = open_store(&["orders"]);
        store
            .put_all_cf("orders", &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")])
            .unwrap();

        // ACT
        store.multi_remove_cf("orders", &[b"a", b"c"]).unwrap();

        // ASSERT
        let values = store.multi_get_cf("orders", &[b"a", b"b", b"c"]).unwrap();
        assert_eq!(values, vec![None, Some(b"2".to_vec()), None]);
    }

    #[test]
    fn test_put_all_writes_every_entry() {
        let (_dir, store) = open_store(&[]);
        let entries: Vec<(Vec<u8>, Vec<u8>)> = (0..50u32)
            .map(|i| (format!("key-{i:03}").into_bytes(), i.to_be_bytes().to_vec()))
            .collect();

        store.put_all(&entries).unwrap();

        for (key, value) in &entries {
            assert_eq!(store.get(key).unwrap().as_ref(), Some(value));
        }
    }

    #[test]
    fn test_delete_range_is_half_open() {
        // ARRANGE: keys a..e
        let (_dir, store) = open_store(&[]);
        for key in [b"a", b"b", b"c", b"d", b"e"] {
            store.put(key, b"x").unwrap();
        }

        // ACT: remove [b, d)
        store.delete_range(b"b", b"d").unwrap();

        // ASSERT
        let mut remaining = Vec::new();
        store
            .iterate(|key, _| {
                remaining.push(key.to_vec());
                true
            })
            .unwrap();
        assert_eq!(remaining, vec![b"a".to_vec(), b"d".to_vec(), b"e".to_vec()]);
    }

    #[test]
    fn test_delete_range_rejects_inverted_bounds() {
        let (_dir, store) = open_store(&[]);

        let result = store.delete_range(b"z", b"a");

        assert!(matches!(result, Err(StorageError::InvalidRange)));
    }

    #[test]
    fn test_iterate_is_ordered_and_stops_early() {
        // ARRANGE
        let (_dir, store) = open_store(&[]);
        for key in [b"3", b"1", b"2", b"5", b"4"] {
            store.put(key, key).unwrap();
        }

        // ACT
        let mut seen = Vec::new();
        let visited = store
            .iterate(|key, value| {
                assert_eq!(key, value);
                seen.push(key[0]);
                seen.len() < 3
            })
            .unwrap();

        // ASSERT
        assert_eq!(visited, 3);
        assert_eq!(seen, vec![b'1', b'2', b'3']);
    }

    // ============================================================
    // ADMINISTRATION
    // ============================================================

    #[test]
    fn test_create_and_delete_column_family() {
        // ARRANGE
        let (_dir, store) = open_store(&[]);

        // ACT
        store.create_column_family("metrics").unwrap();
        store.put_cf("metrics", b"cpu", b"42").unwrap();

        // ASSERT
        assert_eq!(
            store.list_column_families(),
            vec![DEFAULT_COLUMN_FAMILY.to_string(), "metrics".to_string()]
        );
        assert!(matches!(
            store.create_column_family("metrics"),
            Err(StorageError::ColumnFamilyExists(_))
        ));

        store.delete_column_family("metrics").unwrap();
        assert!(store.get_cf("metrics", b"cpu").is_err());
        assert_eq!(store.list_column_families(), vec![DEFAULT_COLUMN_FAMILY.to_string()]);
    }

    #[test]
    fn test_default_family_cannot_be_dropped() {
        let (_dir, store) = open_store(&[]);

        assert!(matches!(
            store.delete_column_family(DEFAULT_COLUMN_FAMILY),
            Err(StorageError::DefaultColumnFamily)
        ));
        assert!(matches!(
            store.delete_column_family("never-created"),
            Err(StorageError::MissingColumnFamily(_))
        ));
    }

    // ============================================================
    // DURABILITY
    // ============================================================

    #[test]
    fn test_data_and_families_survive_reopen() {
        // ARRANGE
        let dir = TempDir::new().unwrap();
        let store = PersistStorage::open(dir.path(), &["orders"]).unwrap();
        store.put_cf("orders", b"o-1", b"shipped").unwrap();
        store.create_column_family("audit").unwrap();
        store.put_cf("audit", b"e-1", b"created").unwrap();

        // ACT
        store.close().unwrap();
        let reopened = PersistStorage::open::<&str>(dir.path(), &[]).unwrap();

        // ASSERT: families created at runtime are found on disk
        assert_eq!(reopened.get_cf("orders", b"o-1").unwrap(), Some(b"shipped".to_vec()));
        assert_eq!(reopened.get_cf("audit", b"e-1").unwrap(), Some(b"created".to_vec()));
        assert!(reopened.list_column_families().contains(&"audit".to_string()));
    }

    #[test]
    fn test_flush_continues_past_failing_family() {
        // ARRANGE
        let mut attempted = Vec::new();

        // ACT
        let result = flush_each(["audit", "orders", "sessions"], |name| {
            attempted.push(name.to_string());
            match name {
                "audit" => Err(StorageError::MissingColumnFamily(name.to_string())),
                "orders" => Err(StorageError::InvalidRange),
                _ => Ok(()),
            }
        });

        // ASSERT: every family is attempted and the first failure is reported
        assert_eq!(attempted, ["audit", "orders", "sessions"]);
        assert!(matches!(result, Err(StorageError::MissingColumnFamily(name)) if name == "audit"));
    }
}
