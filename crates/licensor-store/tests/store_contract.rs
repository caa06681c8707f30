//! ---
//! lic_section: "01-license-store"
//! lic_subsection: "tests"
//! lic_type: "test"
//! lic_scope: "code"
//! lic_description: "Behaviour every license store backend must share."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use licensor_store::{LicenseRecord, LicenseStore, MemoryStore, SqliteStore, StoreError};
use tempfile::tempdir;

fn backends(dir: &std::path::Path) -> Vec<Box<dyn LicenseStore>> {
    vec![
        Box::new(MemoryStore::new()),
        Box::new(SqliteStore::open(dir.join("contract.db")).unwrap()),
    ]
}

#[test]
fn lookups_by_serial_key_and_product() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        let mut tx = store.begin().unwrap();
        tx.save(&LicenseRecord::new("S1", "K1", "product-a")).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        assert_eq!(tx.find_by_serial("S1").unwrap().unwrap().key, "K1");
        assert_eq!(tx.find_by_key("K1").unwrap().unwrap().serial, "S1");
        assert!(tx.find_by_key_and_product("K1", "product-a").unwrap().is_some());
        assert!(
            tx.find_by_key_and_product("K1", "product-b").unwrap().is_none(),
            "{} matched the wrong product",
            store.backend_name()
        );
        assert!(tx.find_by_serial("missing").unwrap().is_none());
    }
}

#[test]
fn save_updates_in_place_by_serial() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        let mut tx = store.begin().unwrap();
        let mut record = LicenseRecord::new("S1", "K1", "p");
        tx.save(&record).unwrap();
        record.bound_entity_id = Some("entity".into());
        tx.save(&record).unwrap();
        tx.commit().unwrap();

        let tx = store.begin().unwrap();
        assert_eq!(tx.count().unwrap(), 1);
        assert!(tx.find_by_serial("S1").unwrap().unwrap().is_bound_to("entity"));
    }
}

#[test]
fn key_uniqueness_is_enforced_on_save() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        let mut tx = store.begin().unwrap();
        tx.save(&LicenseRecord::new("S1", "K1", "p")).unwrap();
        let err = tx.save(&LicenseRecord::new("S2", "K1", "p")).unwrap_err();
        assert!(
            matches!(err, StoreError::UniqueViolation { field: "key", .. }),
            "{}: {err}",
            store.backend_name()
        );
    }
}

#[test]
fn delete_of_missing_record_is_not_found() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        let mut tx = store.begin().unwrap();
        let err = tx.delete(&LicenseRecord::new("ghost", "K", "p")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref serial } if serial == "ghost"));
    }
}

#[test]
fn save_all_is_atomic_with_the_transaction() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        {
            let mut tx = store.begin().unwrap();
            tx.save_all(&[
                LicenseRecord::new("S1", "K1", "p"),
                LicenseRecord::new("S2", "K2", "p"),
            ])
            .unwrap();
            // dropped without commit
        }
        assert_eq!(store.begin().unwrap().count().unwrap(), 0);

        let mut tx = store.begin().unwrap();
        tx.save_all(&[
            LicenseRecord::new("S2", "K2", "p"),
            LicenseRecord::new("S1", "K1", "p"),
        ])
        .unwrap();
        tx.commit().unwrap();

        let serials: Vec<String> = store
            .begin()
            .unwrap()
            .list_all()
            .unwrap()
            .into_iter()
            .map(|record| record.serial)
            .collect();
        assert_eq!(serials, vec!["S1", "S2"]);
    }
}

#[test]
fn committed_delete_removes_key_index() {
    let dir = tempdir().unwrap();
    for store in backends(dir.path()) {
        let record = LicenseRecord::new("S1", "K1", "p");
        let mut tx = store.begin().unwrap();
        tx.save(&record).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        tx.delete(&record).unwrap();
        tx.commit().unwrap();

        let mut tx = store.begin().unwrap();
        assert!(tx.find_by_key("K1").unwrap().is_none());
        tx.save(&LicenseRecord::new("S9", "K1", "p")).unwrap();
        tx.commit().unwrap();
    }
}
