//! Info panel for the single zone currently being viewed.

use crate::ledger::{Membership, Selection};
use crate::types::{format_population, Zone};

/// "Is this the zone being viewed?" predicate, consumed by map styling.
pub trait ViewFocus {
    fn is_selected_for_view(&self, zone: &Zone) -> bool;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CurrentZone {
    #[default]
    Empty,
    Viewing(Zone),
}

impl CurrentZone {
    pub fn zone(&self) -> Option<&Zone> {
        match self {
            CurrentZone::Empty => None,
            CurrentZone::Viewing(zone) => Some(zone),
        }
    }
}

/// Fields as the panel displays them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InfoFields {
    pub postal_code: String,
    pub place: String,
    pub state: String,
    pub population: String,
    pub manager: String,
    pub add_enabled: bool,
}

#[derive(Debug, Default)]
pub struct ZoneInfoPanel {
    current: CurrentZone,
    fields: InfoFields,
    revision: u64,
}

impl ZoneInfoPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `zone` current. Selecting the zone already shown does nothing.
    pub fn select_zone(&mut self, zone: Zone, selection: &dyn Membership) -> bool {
        if self.is_selected_for_view(&zone) {
            return false;
        }
        self.current = CurrentZone::Viewing(zone);
        self.rerender(selection);
        true
    }

    /// Forwards the current zone to `selection` when the add action is enabled.
    pub fn add_to_selection<S: Selection>(&mut self, selection: &mut S) -> bool {
        let added = match &self.current {
            CurrentZone::Viewing(zone) if Self::can_add(zone, &*selection) => selection.add(zone),
            _ => false,
        };
        if added {
            self.rerender(&*selection);
        }
        added
    }

    pub fn reset(&mut self, selection: &dyn Membership) {
        self.current = CurrentZone::Empty;
        self.rerender(selection);
    }

    /// Re-derives the displayed fields from the current zone.
    pub fn rerender(&mut self, selection: &dyn Membership) {
        self.fields = match &self.current {
            CurrentZone::Empty => InfoFields::default(),
            CurrentZone::Viewing(zone) => InfoFields {
                postal_code: zone.postal_code.to_string(),
                place: zone.place.clone(),
                state: zone.state.clone(),
                population: format_population(zone.population),
                manager: zone.manager.clone().unwrap_or_default(),
                add_enabled: Self::can_add(zone, selection),
            },
        };
        self.revision += 1;
    }

    pub fn current(&self) -> &CurrentZone {
        &self.current
    }

    pub fn fields(&self) -> &InfoFields {
        &self.fields
    }

    pub fn add_enabled(&self) -> bool {
        self.fields.add_enabled
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn can_add(zone: &Zone, selection: &dyn Membership) -> bool {
        !zone.is_managed() && !selection.has(zone)
    }
}

impl ViewFocus for ZoneInfoPanel {
    fn is_selected_for_view(&self, zone: &Zone) -> bool {
        self.current
            .zone()
            .is_some_and(|current| current.postal_code == zone.postal_code)
    }
}
