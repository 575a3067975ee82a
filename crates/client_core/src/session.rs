//! Scan session model and the pure transitions applied to it.
//!
//! A [`ScanSession`] lives from one barcode scan until the controller resets
//! it after a commit (or the next scan replaces it). Everything here is free
//! of I/O; the controller owns the store calls and event publication.

use shared::domain::{AdjustmentKind, Barcode, ProductDetails, Record};

use crate::error::ScannerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Barcode captured; lookup pending or failed.
    Scanned,
    /// Barcode matched a stored record.
    Existing,
    /// No stored record; product fields must be entered.
    New,
    PendingAction,
    Committing,
    /// Update written; waiting for the display delay before reset.
    Committed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingAction {
    pub kind: AdjustmentKind,
    pub amount: u32,
    pub prospective_quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSession {
    pub barcode: Option<Barcode>,
    pub matched_record: Option<Record>,
    pub is_existing: bool,
    pub pending_action: Option<PendingAction>,
    /// Product form contents: copied from the matched record, or entered by
    /// the operator for a new product.
    pub details: ProductDetails,
    /// Quantity currently displayed for the product.
    pub current_quantity: u32,
    pub phase: SessionPhase,
}

impl ScanSession {
    pub fn scanned(barcode: Barcode) -> Self {
        Self {
            barcode: Some(barcode),
            phase: SessionPhase::Scanned,
            ..Self::default()
        }
    }

    pub fn show_existing(&mut self, record: Record) {
        self.details = ProductDetails::new(&record.name, &record.color, &record.size);
        self.current_quantity = record.quantity;
        self.matched_record = Some(record);
        self.is_existing = true;
        self.pending_action = None;
        self.phase = SessionPhase::Existing;
    }

    pub fn show_new(&mut self) {
        self.details = ProductDetails::default();
        self.current_quantity = 0;
        self.matched_record = None;
        self.is_existing = false;
        self.pending_action = None;
        self.phase = SessionPhase::New;
    }

    pub fn accepts_update(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Existing | SessionPhase::New | SessionPhase::PendingAction
        )
    }
}

/// Quantity after applying `amount` in direction `kind`. Never negative.
pub fn apply_adjustment(current: u32, kind: AdjustmentKind, amount: u32) -> u32 {
    match kind {
        AdjustmentKind::Add => current.saturating_add(amount),
        AdjustmentKind::Subtract => current.saturating_sub(amount),
    }
}

/// Checks the form for the session's state and computes the pending action.
///
/// Existing products only need a positive amount; new products also need
/// name, color and size.
pub fn validate_update(
    session: &ScanSession,
    kind: AdjustmentKind,
    amount: i64,
    details: &ProductDetails,
) -> Result<PendingAction, ScannerError> {
    match session.phase {
        SessionPhase::Committing => {
            return Err(ScannerError::validation(
                "An inventory update is already in progress",
            ))
        }
        _ if !session.accepts_update() => {
            return Err(ScannerError::validation(
                "Scan a product before updating inventory",
            ))
        }
        _ => {}
    }

    if !session.is_existing {
        let details = details.trimmed();
        if details.name.is_empty() {
            return Err(ScannerError::validation("Please enter a product name"));
        }
        if details.color.is_empty() {
            return Err(ScannerError::validation("Please enter a color"));
        }
        if details.size.is_empty() {
            return Err(ScannerError::validation("Please enter a size"));
        }
    }

    let amount = u32::try_from(amount)
        .ok()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| ScannerError::validation("Please enter a valid quantity"))?;

    Ok(PendingAction {
        kind,
        amount,
        prospective_quantity: apply_adjustment(session.current_quantity, kind, amount),
    })
}

/// Splits a signed preset such as `+5` or `-1` into a direction and amount.
pub fn split_delta(delta: i64) -> Result<(AdjustmentKind, i64), ScannerError> {
    match delta {
        0 => Err(ScannerError::validation("Please enter a valid quantity")),
        d if d > 0 => Ok((AdjustmentKind::Add, d)),
        d => Ok((AdjustmentKind::Subtract, d.saturating_abs())),
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::RecordId;

    use super::*;

    fn record(quantity: u32) -> Record {
        Record {
            id: RecordId("rec1".into()),
            barcode: Barcode("123".into()),
            name: "Widget".into(),
            quantity,
            color: "Blue".into(),
            size: "S".into(),
            last_updated: None,
        }
    }

    fn existing(quantity: u32) -> ScanSession {
        let mut session = ScanSession::scanned(Barcode("123".into()));
        session.show_existing(record(quantity));
        session
    }

    fn new_product() -> ScanSession {
        let mut session = ScanSession::scanned(Barcode("999".into()));
        session.show_new();
        session
    }

    #[test]
    fn add_and_subtract_follow_clamped_arithmetic() {
        for current in [0u32, 1, 7, 100] {
            for amount in [1u32, 3, 7, 250] {
                assert_eq!(
                    apply_adjustment(current, AdjustmentKind::Add, amount),
                    current + amount
                );
                assert_eq!(
                    apply_adjustment(current, AdjustmentKind::Subtract, amount),
                    (i64::from(current) - i64::from(amount)).max(0) as u32
                );
            }
        }
    }

    #[test]
    fn existing_product_needs_only_amount() {
        let pending = validate_update(
            &existing(10),
            AdjustmentKind::Subtract,
            4,
            &ProductDetails::default(),
        )
        .expect("valid");
        assert_eq!(pending.prospective_quantity, 6);
    }

    #[test]
    fn new_product_requires_every_field() {
        let session = new_product();
        let cases = [
            (ProductDetails::new("", "Red", "M"), "product name"),
            (ProductDetails::new("Hat", " ", "M"), "color"),
            (ProductDetails::new("Hat", "Red", ""), "size"),
        ];
        for (details, expected) in cases {
            let err = validate_update(&session, AdjustmentKind::Add, 1, &details)
                .expect_err("must fail");
            assert!(err.to_string().contains(expected), "{err}");
        }

        let pending = validate_update(
            &session,
            AdjustmentKind::Add,
            2,
            &ProductDetails::new("Hat", "Red", "M"),
        )
        .expect("valid");
        assert_eq!(pending.prospective_quantity, 2);
    }

    #[test]
    fn rejects_non_positive_amounts() {
        for amount in [0, -3] {
            let err = validate_update(
                &existing(5),
                AdjustmentKind::Add,
                amount,
                &ProductDetails::default(),
            )
            .expect_err("must fail");
            assert!(matches!(err, ScannerError::ValidationFailed(_)));
        }
    }

    #[test]
    fn rejects_updates_before_lookup_completes() {
        let session = ScanSession::scanned(Barcode("1".into()));
        assert!(validate_update(
            &session,
            AdjustmentKind::Add,
            1,
            &ProductDetails::new("a", "b", "c")
        )
        .is_err());

        let mut committing = existing(3);
        committing.phase = SessionPhase::Committing;
        let err = validate_update(
            &committing,
            AdjustmentKind::Add,
            1,
            &ProductDetails::default(),
        )
        .expect_err("must fail");
        assert!(err.to_string().contains("already in progress"));
    }

    #[test]
    fn split_delta_maps_sign_to_direction() {
        assert_eq!(split_delta(5).expect("add"), (AdjustmentKind::Add, 5));
        assert_eq!(
            split_delta(-10).expect("subtract"),
            (AdjustmentKind::Subtract, 10)
        );
        assert!(split_delta(0).is_err());
    }
}
