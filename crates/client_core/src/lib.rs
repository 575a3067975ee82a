use std::{sync::Arc, time::Duration};

use chrono::Utc;
use shared::domain::{
    AdjustmentKind, Barcode, NewRecord, ProductDetails, QuantityUpdate, Record, RecordId,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};

pub mod capture;
pub mod config;
pub mod demo_store;
pub mod error;
pub mod retry;
pub mod session;
pub mod store;

pub use config::StoreConfig;
pub use error::{ScannerError, StoreError};
pub use retry::RetryPolicy;
pub use session::{PendingAction, ScanSession, SessionPhase};
pub use store::{
    DefaultStoreConnector, HttpStoreOptions, RecordStore, RecordStoreConnector,
};

/// Pause between a successful commit and the reset for the next scan.
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_secs(3);
const CONNECTION_PROBE_RECORDS: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Operator-facing status line published by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    Existing(Record),
    New(Barcode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub record: Record,
    pub kind: AdjustmentKind,
    pub amount: u32,
    pub new_quantity: u32,
}

enum StoreWrite {
    Update { id: RecordId, update: QuantityUpdate },
    Create(NewRecord),
}

struct ControllerState {
    config: Option<StoreConfig>,
    store: Option<Arc<dyn RecordStore>>,
    session: ScanSession,
    /// Bumped on every scan and reset so late store responses for an older
    /// session are discarded.
    generation: u64,
}

pub struct ScannerController {
    connector: Arc<dyn RecordStoreConnector>,
    retry: RetryPolicy,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<StatusEvent>,
}

impl ScannerController {
    pub fn new(options: HttpStoreOptions, retry: RetryPolicy) -> Arc<Self> {
        Self::new_with_connector(Arc::new(DefaultStoreConnector::new(options)), retry)
    }

    pub fn new_with_connector(
        connector: Arc<dyn RecordStoreConnector>,
        retry: RetryPolicy,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            connector,
            retry,
            inner: Mutex::new(ControllerState {
                config: None,
                store: None,
                session: ScanSession::default(),
                generation: 0,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> ScanSession {
        self.inner.lock().await.session.clone()
    }

    pub async fn is_configured(&self) -> bool {
        self.inner.lock().await.config.is_some()
    }

    fn emit(&self, kind: StatusKind, message: impl Into<String>) {
        let _ = self.events.send(StatusEvent {
            kind,
            message: message.into(),
        });
    }

    fn fail<T>(&self, err: ScannerError) -> Result<T, ScannerError> {
        self.emit(StatusKind::Error, err.to_string());
        Err(err)
    }

    /// Validates and saves the store configuration. The previous one stays
    /// in effect when validation fails.
    pub async fn configure(&self, config: StoreConfig) -> Result<(), ScannerError> {
        let config = match config.validate() {
            Ok(config) => config,
            Err(err) => return self.fail(err),
        };
        let store = match self.connector.connect(&config) {
            Ok(store) => store,
            Err(err) => return self.fail(ScannerError::configuration(err.to_string())),
        };

        info!(
            store_id = %config.store_id,
            table = %config.table_name,
            demo = config.demo,
            "scanner: configuration saved"
        );
        {
            let mut guard = self.inner.lock().await;
            guard.config = Some(config);
            guard.store = Some(store);
            // A new store starts from an empty session.
            guard.generation += 1;
            guard.session = ScanSession::default();
        }
        self.emit(
            StatusKind::Success,
            "Configuration saved successfully! Run a connection test to verify.",
        );
        Ok(())
    }

    async fn configured_store(&self) -> Result<(StoreConfig, Arc<dyn RecordStore>), ScannerError> {
        let guard = self.inner.lock().await;
        match (&guard.config, &guard.store) {
            (Some(config), Some(store)) => Ok((config.clone(), store.clone())),
            _ => Err(ScannerError::configuration(
                "Please configure the record store connection first",
            )),
        }
    }

    pub async fn test_connection(&self) -> Result<(), ScannerError> {
        let (config, store) = match self.configured_store().await {
            Ok(configured) => configured,
            Err(err) => return self.fail(err),
        };

        if config.demo {
            info!("scanner: demo mode connection test");
            self.emit(
                StatusKind::Success,
                "Demo mode: Connection test successful! You can now scan demo barcodes.",
            );
            return Ok(());
        }

        self.emit(StatusKind::Info, "Testing connection...");
        let result = self
            .retry
            .run("list_records", || store.list(CONNECTION_PROBE_RECORDS))
            .await;
        match result {
            Ok(records) => {
                info!(records = records.len(), "scanner: connection test succeeded");
                self.emit(
                    StatusKind::Success,
                    "Connection successful! Ready to scan barcodes.",
                );
                Ok(())
            }
            Err(err) => self.fail(ScannerError::ConnectionFailed(err.to_string())),
        }
    }

    /// Entry point for the capture feed. Blank codes are ignored.
    pub async fn on_barcode_detected(
        &self,
        code: &str,
    ) -> Result<Option<LookupOutcome>, ScannerError> {
        if !self.is_configured().await {
            return self.fail(ScannerError::configuration(
                "Please configure the record store connection first",
            ));
        }
        let Some(barcode) = Barcode::parse(code) else {
            return Ok(None);
        };
        info!(barcode = %barcode, "scanner: barcode detected");
        self.lookup(barcode).await.map(Some)
    }

    /// Starts a new session for `barcode` and resolves it against the store.
    pub async fn lookup(&self, barcode: Barcode) -> Result<LookupOutcome, ScannerError> {
        let (_, store) = match self.configured_store().await {
            Ok(configured) => configured,
            Err(err) => return self.fail(err),
        };
        let generation = {
            let mut guard = self.inner.lock().await;
            guard.generation += 1;
            guard.session = ScanSession::scanned(barcode.clone());
            guard.generation
        };
        self.emit(StatusKind::Info, "Looking up product...");

        let result = self
            .retry
            .run("find_record", || store.find_by_barcode(&barcode))
            .await;

        let mut guard = self.inner.lock().await;
        let current = guard.generation == generation;
        match result {
            Ok(records) => {
                let outcome = match records.into_iter().next() {
                    Some(record) => LookupOutcome::Existing(record),
                    None => LookupOutcome::New(barcode.clone()),
                };
                if !current {
                    info!(barcode = %barcode, "scanner: discarding lookup for replaced session");
                    return Ok(outcome);
                }
                match &outcome {
                    LookupOutcome::Existing(record) => {
                        guard.session.show_existing(record.clone());
                        drop(guard);
                        info!(barcode = %barcode, record_id = %record.id, "scanner: existing product");
                        self.emit(
                            StatusKind::Info,
                            format!("Found existing product: {}", record.name),
                        );
                    }
                    LookupOutcome::New(_) => {
                        guard.session.show_new();
                        drop(guard);
                        info!(barcode = %barcode, "scanner: new product");
                        self.emit(
                            StatusKind::Info,
                            "New product detected. Please enter the product name, color and size.",
                        );
                    }
                }
                Ok(outcome)
            }
            Err(err) => {
                drop(guard);
                warn!(barcode = %barcode, error = %err, "scanner: lookup failed");
                self.fail(ScannerError::LookupFailed(err.to_string()))
            }
        }
    }

    /// Validates the product form and records the action to confirm. The
    /// store is not touched.
    pub async fn prepare_update(
        &self,
        kind: AdjustmentKind,
        amount: i64,
        details: &ProductDetails,
    ) -> Result<PendingAction, ScannerError> {
        let mut guard = self.inner.lock().await;
        let pending = match session::validate_update(&guard.session, kind, amount, details) {
            Ok(pending) => pending,
            Err(err) => {
                drop(guard);
                return self.fail(err);
            }
        };
        if !guard.session.is_existing {
            guard.session.details = details.trimmed();
        }
        guard.session.pending_action = Some(pending);
        guard.session.phase = SessionPhase::PendingAction;
        drop(guard);

        self.emit(
            StatusKind::Info,
            format!(
                "Ready to {} {} units. Confirm to apply.",
                kind.verb(),
                pending.amount
            ),
        );
        Ok(pending)
    }

    /// Signed preset: positive adds, negative subtracts.
    pub async fn quick_adjust(
        &self,
        delta: i64,
        details: &ProductDetails,
    ) -> Result<PendingAction, ScannerError> {
        let (kind, amount) = match session::split_delta(delta) {
            Ok(split) => split,
            Err(err) => return self.fail(err),
        };
        self.prepare_update(kind, amount, details).await
    }

    /// Writes the pending action to the store. On failure the action stays
    /// pending so the operator can confirm again.
    pub async fn commit_update(&self) -> Result<CommitOutcome, ScannerError> {
        let (store, generation, pending, write) = {
            let mut guard = self.inner.lock().await;
            if guard.session.phase == SessionPhase::Committing {
                drop(guard);
                return self.fail(ScannerError::validation(
                    "An inventory update is already in progress",
                ));
            }
            let Some(pending) = guard.session.pending_action else {
                drop(guard);
                return self.fail(ScannerError::validation(
                    "No pending inventory update to confirm",
                ));
            };
            let Some(store) = guard.store.clone() else {
                drop(guard);
                return self.fail(ScannerError::configuration(
                    "Please configure the record store connection first",
                ));
            };
            let Some(barcode) = guard.session.barcode.clone() else {
                drop(guard);
                return self.fail(ScannerError::validation(
                    "Scan a product before updating inventory",
                ));
            };

            let current = guard.session.current_quantity;
            let new_quantity = session::apply_adjustment(current, pending.kind, pending.amount);
            if pending.kind == AdjustmentKind::Subtract && current < pending.amount {
                self.emit(
                    StatusKind::Warning,
                    format!(
                        "Cannot subtract {} from {current}. Setting quantity to 0.",
                        pending.amount
                    ),
                );
            }

            let last_updated = Utc::now();
            let write = match &guard.session.matched_record {
                Some(record) => StoreWrite::Update {
                    id: record.id.clone(),
                    update: QuantityUpdate {
                        quantity: new_quantity,
                        last_updated,
                    },
                },
                None => StoreWrite::Create(NewRecord {
                    barcode,
                    details: guard.session.details.clone(),
                    quantity: new_quantity,
                    last_updated,
                }),
            };
            guard.session.phase = SessionPhase::Committing;
            (
                store,
                guard.generation,
                PendingAction {
                    prospective_quantity: new_quantity,
                    ..pending
                },
                write,
            )
        };

        self.emit(StatusKind::Info, "Updating inventory...");
        let result = match &write {
            StoreWrite::Update { id, update } => {
                self.retry
                    .run("update_record", || store.update(id, update))
                    .await
            }
            StoreWrite::Create(record) => {
                // A lost response may hide an applied write; only statuses retry.
                self.retry
                    .run_if("create_record", StoreError::is_retryable_response, || {
                        store.create(record)
                    })
                    .await
            }
        };

        let mut guard = self.inner.lock().await;
        let current = guard.generation == generation;
        match result {
            Ok(record) => {
                if current {
                    guard.session.show_existing(record.clone());
                    guard.session.current_quantity = pending.prospective_quantity;
                    guard.session.phase = SessionPhase::Committed;
                }
                drop(guard);
                info!(
                    record_id = %record.id,
                    kind = pending.kind.verb(),
                    amount = pending.amount,
                    quantity = pending.prospective_quantity,
                    "scanner: inventory updated"
                );
                self.emit(
                    StatusKind::Success,
                    format!(
                        "Successfully {} {} units! New quantity: {}",
                        pending.kind.past_tense(),
                        pending.amount,
                        pending.prospective_quantity
                    ),
                );
                Ok(CommitOutcome {
                    record,
                    kind: pending.kind,
                    amount: pending.amount,
                    new_quantity: pending.prospective_quantity,
                })
            }
            Err(err) => {
                if current {
                    guard.session.phase = SessionPhase::PendingAction;
                }
                drop(guard);
                warn!(error = %err, "scanner: inventory update failed");
                self.fail(ScannerError::UpdateFailed(err.to_string()))
            }
        }
    }

    /// Drops the current session and returns to `Idle`.
    pub async fn reset_for_next_scan(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.generation += 1;
            guard.session = ScanSession::default();
        }
        self.emit(StatusKind::Info, "Ready for next scan.");
    }

    /// Resets after `delay` unless another scan replaced the committed
    /// session in the meantime.
    pub fn schedule_reset(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let generation = controller.inner.lock().await.generation;
            tokio::time::sleep(delay).await;
            let still_committed = {
                let guard = controller.inner.lock().await;
                guard.generation == generation && guard.session.phase == SessionPhase::Committed
            };
            if still_committed {
                controller.reset_for_next_scan().await;
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/mock_store.rs"]
mod mock_store;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
