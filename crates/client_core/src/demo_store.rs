use async_trait::async_trait;
use shared::domain::{Barcode, NewRecord, QuantityUpdate, Record, RecordId};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{error::StoreError, store::RecordStore};

const DEMO_ID_PREFIX: &str = "demo_";

/// Barcodes, names and starting quantities of the demo catalogue.
pub const DEMO_PRODUCTS: [(&str, &str, u32); 3] = [
    ("123456789012", "Demo Product A", 15),
    ("987654321098", "Demo Product B", 8),
    ("456789123456", "Demo Product C", 0),
];

/// In-memory record store backing demo mode.
#[derive(Default)]
pub struct DemoRecordStore {
    records: Mutex<Vec<Record>>,
}

impl DemoRecordStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn seeded() -> Self {
        let records = DEMO_PRODUCTS
            .iter()
            .map(|(barcode, name, quantity)| Record {
                id: RecordId(format!("{DEMO_ID_PREFIX}{barcode}")),
                barcode: Barcode((*barcode).to_string()),
                name: (*name).to_string(),
                quantity: *quantity,
                color: String::new(),
                size: String::new(),
                last_updated: None,
            })
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub async fn snapshot(&self) -> Vec<Record> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordStore for DemoRecordStore {
    async fn list(&self, max_records: u32) -> Result<Vec<Record>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().take(max_records as usize).cloned().collect())
    }

    async fn find_by_barcode(&self, barcode: &Barcode) -> Result<Vec<Record>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| &record.barcode == barcode)
            .cloned()
            .collect())
    }

    async fn create(&self, record: &NewRecord) -> Result<Record, StoreError> {
        let created = Record {
            id: RecordId(format!("{DEMO_ID_PREFIX}{}", Uuid::new_v4().simple())),
            barcode: record.barcode.clone(),
            name: record.details.name.clone(),
            quantity: record.quantity,
            color: record.details.color.clone(),
            size: record.details.size.clone(),
            last_updated: Some(record.last_updated),
        };
        self.records.lock().await.push(created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        id: &RecordId,
        update: &QuantityUpdate,
    ) -> Result<Record, StoreError> {
        let mut records = self.records.lock().await;
        let record = records
            .iter_mut()
            .find(|record| &record.id == id)
            .ok_or_else(|| StoreError::Api {
                status: 404,
                message: format!("Could not find record {id}"),
            })?;
        record.quantity = update.quantity;
        record.last_updated = Some(update.last_updated);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use shared::domain::ProductDetails;

    use super::*;

    #[tokio::test]
    async fn seeded_catalogue_matches_demo_products() {
        let store = DemoRecordStore::seeded();
        let found = store
            .find_by_barcode(&Barcode("987654321098".into()))
            .await
            .expect("lookup");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Demo Product B");
        assert_eq!(found[0].quantity, 8);
        assert_eq!(found[0].id.as_str(), "demo_987654321098");
    }

    #[tokio::test]
    async fn created_records_are_visible_to_later_lookups() {
        let store = DemoRecordStore::empty();
        let created = store
            .create(&NewRecord {
                barcode: Barcode("555".into()),
                details: ProductDetails::new("Scarf", "Green", "L"),
                quantity: 4,
                last_updated: Utc::now(),
            })
            .await
            .expect("create");
        assert!(created.id.as_str().starts_with(DEMO_ID_PREFIX));

        let found = store
            .find_by_barcode(&Barcode("555".into()))
            .await
            .expect("lookup");
        assert_eq!(found, vec![created]);
    }

    #[tokio::test]
    async fn update_of_unknown_record_is_not_found() {
        let store = DemoRecordStore::empty();
        let err = store
            .update(
                &RecordId("missing".into()),
                &QuantityUpdate {
                    quantity: 1,
                    last_updated: Utc::now(),
                },
            )
            .await
            .expect_err("must fail");
        assert_eq!(err.status(), Some(404));
    }
}
