//! Orchestrates the info panel, the selection ledger and the map view.
//!
//! The controller never waits on the network. Fetches go out through the injected
//! [`Fetch`] contract and come back as [`Event`]s, as do the notifications raised by the
//! ledger row actions and by map clicks. Every handler runs to completion before the next
//! event is looked at, so the only concurrency control needed is the single-flight guard
//! over [`ExplorationController::select_postal_code`].

use crate::config::MapConfig;
use crate::error::FetchError;
use crate::info::ZoneInfoPanel;
use crate::ledger::SelectionLedger;
use crate::map::MapView;
use crate::types::{PostalCode, ZoneFeature};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    /// Primary lookup for a search; `generation` identifies the session that issued it.
    Zone { code: PostalCode, generation: u64, fly: bool },
    Neighbour { code: PostalCode },
}

/// User-facing entry points, as sent by the surrounding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Click(String),
    Add,
    Delete(String),
    Center(String),
    Reset,
    Suggest(String),
    Show,
    Help,
    Quit,
}

#[derive(Debug)]
pub enum Event {
    Command(Command),
    /// A map click or a ledger "center" action wants a zone shown.
    FocusRequested { code: PostalCode, fly: bool },
    /// A ledger row was deleted.
    SelectionChanged(PostalCode),
    ZoneLoaded {
        code: PostalCode,
        generation: u64,
        fly: bool,
        result: Result<ZoneFeature, FetchError>,
    },
    NeighbourLoaded {
        code: PostalCode,
        result: Result<ZoneFeature, FetchError>,
    },
}

pub type Fetch = Rc<dyn Fn(FetchRequest)>;
pub type Notify = Rc<dyn Fn(Event)>;

pub struct ExplorationController {
    info: ZoneInfoPanel,
    ledger: SelectionLedger,
    map: MapView,
    search: String,
    searching: bool,
    generation: u64,
    fetch: Fetch,
}

impl fmt::Debug for ExplorationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExplorationController")
            .field("info", &self.info)
            .field("ledger", &self.ledger)
            .field("map", &self.map)
            .field("searching", &self.searching)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ExplorationController {
    pub fn new(settings: MapConfig, fetch: Fetch, notify: Notify) -> Self {
        let center = Rc::clone(&notify);
        let deleted = Rc::clone(&notify);
        let clicked = notify;
        let ledger = SelectionLedger::new(
            Box::new(move |code: &PostalCode| center(Event::FocusRequested { code: code.clone(), fly: true })),
            Box::new(move |code: &PostalCode| deleted(Event::SelectionChanged(code.clone()))),
        );

        let neighbour_fetch = Rc::clone(&fetch);
        let map = MapView::new(
            settings,
            Box::new(move |code: &PostalCode| clicked(Event::FocusRequested { code: code.clone(), fly: false })),
            Box::new(move |code: &PostalCode| neighbour_fetch(FetchRequest::Neighbour { code: code.clone() })),
        );

        let mut controller = Self {
            info: ZoneInfoPanel::new(),
            ledger,
            map,
            search: String::new(),
            searching: false,
            generation: 0,
            fetch,
        };
        controller.reset();
        controller
    }

    /// Starts a lookup unless one is already in flight. Returns whether a fetch was issued.
    pub fn select_postal_code(&mut self, code: &str, fly: bool) -> bool {
        if self.searching {
            debug!(code, "search in flight, dropping");
            return false;
        }
        self.searching = true;
        self.search = code.to_string();
        let Ok(code) = PostalCode::new(code) else {
            self.searching = false;
            return false;
        };
        (self.fetch)(FetchRequest::Zone { code, generation: self.generation, fly });
        true
    }

    pub fn add_to_selection(&mut self) -> bool {
        if !self.info.add_to_selection(&mut self.ledger) {
            return false;
        }
        self.map.restyle_all(&self.ledger, &self.info);
        true
    }

    /// Ledger row "delete" action.
    pub fn delete_selection(&mut self, code: &str) -> bool {
        match PostalCode::new(code) {
            Ok(code) => self.ledger.delete(&code),
            Err(_) => false,
        }
    }

    /// Ledger row "center" action.
    pub fn center_selection(&self, code: &str) -> bool {
        match PostalCode::new(code) {
            Ok(code) => self.ledger.center(&code),
            Err(_) => false,
        }
    }

    pub fn click_zone(&self, code: &str) -> bool {
        self.map.click(code)
    }

    pub fn reset(&mut self) {
        self.info.reset(&self.ledger);
        self.ledger.reset();
        self.map.reset();
        self.search.clear();
        // outstanding primary lookups belong to the old session
        self.searching = false;
        self.generation += 1;
    }

    /// Runs a UI command. `Suggest`, `Show`, `Help` and `Quit` belong to the surrounding UI.
    pub fn execute(&mut self, command: Command) {
        match command {
            Command::Search(code) => {
                self.select_postal_code(&code, true);
            }
            Command::Click(code) => {
                self.click_zone(&code);
            }
            Command::Add => {
                self.add_to_selection();
            }
            Command::Delete(code) => {
                self.delete_selection(&code);
            }
            Command::Center(code) => {
                self.center_selection(&code);
            }
            Command::Reset => self.reset(),
            Command::Suggest(_) | Command::Show | Command::Help | Command::Quit => {}
        }
    }

    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.execute(command),
            Event::FocusRequested { code, fly } => {
                self.select_postal_code(code.as_str(), fly);
            }
            Event::SelectionChanged(code) => {
                debug!(%code, "selection changed");
                self.info.rerender(&self.ledger);
                self.map.restyle_all(&self.ledger, &self.info);
            }
            Event::ZoneLoaded { code, generation, fly, result } => {
                self.on_zone_loaded(code, generation, fly, result);
            }
            Event::NeighbourLoaded { code, result } => {
                self.map.on_neighbour_loaded(code, result, &self.ledger, &self.info);
            }
        }
    }

    fn on_zone_loaded(
        &mut self,
        code: PostalCode,
        generation: u64,
        fly: bool,
        result: Result<ZoneFeature, FetchError>,
    ) {
        if generation != self.generation {
            debug!(%code, "dropping lookup from before reset");
            return;
        }
        self.searching = false;
        let feature = match result {
            Ok(feature) => Arc::new(feature),
            Err(e) => {
                debug!(%code, error = %e, "lookup failed");
                return;
            }
        };
        self.info.select_zone(feature.zone.clone(), &self.ledger);
        self.map.focus(Arc::clone(&feature), fly);
        self.map.ensure_neighbours_loaded(&feature.zone);
        self.map.restyle_all(&self.ledger, &self.info);
    }

    pub fn info(&self) -> &ZoneInfoPanel {
        &self.info
    }

    pub fn ledger(&self) -> &SelectionLedger {
        &self.ledger
    }

    pub fn map(&self) -> &MapView {
        &self.map
    }

    pub fn search_input(&self) -> &str {
        &self.search
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }
}
