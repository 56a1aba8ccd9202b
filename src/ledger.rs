//! The user's running selection of zones and its population total.

use crate::types::{format_population, PostalCode, Zone};
use indexmap::IndexMap;
use std::fmt;
use tracing::warn;

/// Membership predicate over the selection, consumed by styling and the info panel.
pub trait Membership {
    fn has(&self, zone: &Zone) -> bool;
}

/// A selection that can be extended. Returns `true` when `zone` was newly added.
pub trait Selection: Membership {
    fn add(&mut self, zone: &Zone) -> bool;
}

/// One displayed row of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub place: String,
    pub postal_code: PostalCode,
    pub population: String,
}

pub type RowAction = Box<dyn Fn(&PostalCode)>;

pub struct SelectionLedger {
    entries: IndexMap<PostalCode, Zone>,
    total_population: u64,
    rows: Vec<LedgerRow>,
    total_display: String,
    revision: u64,
    on_center: RowAction,
    on_delete: RowAction,
}

impl SelectionLedger {
    /// `on_center` fires when a row's center action is used, `on_delete` after a zone
    /// has been removed.
    pub fn new(on_center: RowAction, on_delete: RowAction) -> Self {
        Self {
            entries: IndexMap::new(),
            total_population: 0,
            rows: Vec::new(),
            total_display: format_population(0),
            revision: 0,
            on_center,
            on_delete,
        }
    }

    pub fn remove(&mut self, zone: &Zone) -> bool {
        self.delete(&zone.postal_code)
    }

    /// Row "delete" action.
    pub fn delete(&mut self, code: &PostalCode) -> bool {
        let Some(removed) = self.entries.shift_remove(code) else {
            return false;
        };
        // subtract the snapshot taken at add time, not whatever the caller holds now
        self.total_population -= removed.population;
        self.rows.retain(|row| row.postal_code != *code);
        self.render();
        (self.on_delete)(code);
        true
    }

    /// Row "center" action.
    pub fn center(&self, code: &PostalCode) -> bool {
        if !self.entries.contains_key(code) {
            return false;
        }
        (self.on_center)(code);
        true
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.rows.clear();
        self.total_population = 0;
        self.render();
    }

    pub fn total_population(&self) -> u64 {
        self.total_population
    }

    pub fn total_display(&self) -> &str {
        &self.total_display
    }

    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of render passes so far.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn render(&mut self) {
        self.total_display = format_population(self.total_population);
        self.revision += 1;
    }
}

impl Membership for SelectionLedger {
    fn has(&self, zone: &Zone) -> bool {
        self.entries.contains_key(&zone.postal_code)
    }
}

impl Selection for SelectionLedger {
    fn add(&mut self, zone: &Zone) -> bool {
        if self.has(zone) {
            return false;
        }
        let Some(total) = self.total_population.checked_add(zone.population) else {
            warn!(
                postal_code = %zone.postal_code,
                population = zone.population,
                total = self.total_population,
                "population total would overflow, zone not added"
            );
            return false;
        };
        self.entries.insert(zone.postal_code.clone(), zone.clone());
        self.total_population = total;
        self.rows.push(LedgerRow {
            place: zone.place.clone(),
            postal_code: zone.postal_code.clone(),
            population: format_population(zone.population),
        });
        self.render();
        true
    }
}

impl fmt::Debug for SelectionLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectionLedger")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .field("total_population", &self.total_population)
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_ledger() -> (SelectionLedger, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let centers = Rc::clone(&log);
        let deletes = Rc::clone(&log);
        let ledger = SelectionLedger::new(
            Box::new(move |code: &PostalCode| centers.borrow_mut().push(format!("center {code}"))),
            Box::new(move |code: &PostalCode| deletes.borrow_mut().push(format!("delete {code}"))),
        );
        (ledger, log)
    }

    fn silent_ledger() -> SelectionLedger {
        SelectionLedger::new(Box::new(|_: &PostalCode| {}), Box::new(|_: &PostalCode| {}))
    }

    #[test]
    fn test_add_updates_total_and_rows() {
        let mut ledger = silent_ledger();
        assert!(ledger.add(&fixtures::zone("10115", 20313)));
        assert!(ledger.add(&fixtures::zone("10117", 1000)));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.total_population(), 21313);
        assert_eq!(ledger.total_display(), "21,313");
        assert_eq!(ledger.rows()[0].postal_code.as_str(), "10115");
        assert_eq!(ledger.rows()[1].population, "1,000");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut ledger = silent_ledger();
        let zone = fixtures::zone("10115", 300);
        assert!(ledger.add(&zone));
        let revision = ledger.revision();

        assert!(!ledger.add(&zone));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.rows().len(), 1);
        assert_eq!(ledger.total_population(), 300);
        assert_eq!(ledger.revision(), revision);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (mut ledger, log) = recording_ledger();
        assert!(!ledger.remove(&fixtures::zone("10115", 1)));
        assert_eq!(ledger.revision(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_delete_notifies_after_removal() {
        let (mut ledger, log) = recording_ledger();
        ledger.add(&fixtures::zone("10115", 10));
        ledger.add(&fixtures::zone("10117", 5));

        assert!(ledger.delete(&fixtures::code("10115")));

        assert_eq!(*log.borrow(), vec!["delete 10115".to_string()]);
        assert_eq!(ledger.total_population(), 5);
        assert_eq!(ledger.rows().len(), 1);
        assert!(!ledger.has(&fixtures::zone("10115", 10)));
    }

    #[test]
    fn test_remove_uses_snapshot_population() {
        let mut ledger = silent_ledger();
        ledger.add(&fixtures::zone("10115", 10));
        ledger.remove(&fixtures::zone("10115", 999));
        assert_eq!(ledger.total_population(), 0);
    }

    #[test]
    fn test_center_only_for_present_rows() {
        let (mut ledger, log) = recording_ledger();
        ledger.add(&fixtures::zone("10115", 10));

        assert!(ledger.center(&fixtures::code("10115")));
        assert!(!ledger.center(&fixtures::code("99999")));

        assert_eq!(*log.borrow(), vec!["center 10115".to_string()]);
    }

    #[test]
    fn test_add_rejects_total_overflow() {
        let mut ledger = silent_ledger();
        let huge: Zone = serde_json::from_value(serde_json::json!({
            "postalCode": "10115",
            "place": "Berlin",
            "state": "Berlin",
            "population": "18446744073709551615",
            "center": [52.53, 13.38]
        }))
        .unwrap();
        assert!(ledger.add(&huge));
        let revision = ledger.revision();

        assert!(!ledger.add(&fixtures::zone("10117", 1)));

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.rows().len(), 1);
        assert_eq!(ledger.total_population(), u64::MAX);
        assert_eq!(ledger.revision(), revision);
        assert!(!ledger.has(&fixtures::zone("10117", 1)));

        assert!(ledger.delete(&fixtures::code("10115")));
        assert!(ledger.add(&fixtures::zone("10117", 1)));
        assert_eq!(ledger.total_population(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut ledger = silent_ledger();
        ledger.add(&fixtures::zone("10115", 10));
        ledger.reset();

        assert!(ledger.is_empty());
        assert!(ledger.rows().is_empty());
        assert_eq!(ledger.total_population(), 0);
        assert_eq!(ledger.total_display(), "0");
    }

    proptest! {
        #[test]
        fn prop_total_matches_recomputation(
            ops in prop::collection::vec((any::<bool>(), 0usize..8, prop_oneof![0u64..1_000_000, (u64::MAX / 4)..=u64::MAX]), 0..64)
        ) {
            let mut ledger = silent_ledger();
            for (add, idx, population) in ops {
                let zone = fixtures::zone(&format!("1011{idx}"), population);
                if add {
                    ledger.add(&zone);
                } else {
                    ledger.remove(&zone);
                }
                let recomputed = ledger.zones().try_fold(0u64, |acc, z| acc.checked_add(z.population));
                prop_assert_eq!(Some(ledger.total_population()), recomputed);
                prop_assert_eq!(ledger.rows().len(), ledger.len());
            }
        }
    }
}
