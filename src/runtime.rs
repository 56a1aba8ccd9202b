//! Event loop that drives the explorer.
//!
//! One task owns the controller and drains a single unbounded channel. Fetches run as
//! spawned tasks and post their completion back into that channel, so each completion is
//! handled as its own later event, in whatever order the network delivers them.

use crate::binding::{parse_command, Presented, ViewBinding};
use crate::config::MapConfig;
use crate::controller::{Command, Event, ExplorationController, Fetch, FetchRequest, Notify};
use crate::error::FetchError;
use crate::source::ZoneSource;
use crate::types::{PostalCode, ZoneCatalog, ZoneFeature};
use std::io::{self, BufRead};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Fetch contract backed by `source`: one spawned task per request. A request that has not
/// finished after `deadline` completes as [`FetchError::TimedOut`], so the controller always
/// hears back.
pub fn fetcher(source: Arc<dyn ZoneSource>, events: UnboundedSender<Event>, deadline: Duration) -> Fetch {
    Rc::new(move |request: FetchRequest| {
        let source = Arc::clone(&source);
        let events = events.clone();
        tokio::spawn(async move {
            let event = match request {
                FetchRequest::Zone { code, generation, fly } => {
                    let result = fetch_within(source.as_ref(), &code, deadline).await;
                    Event::ZoneLoaded { code, generation, fly, result }
                }
                FetchRequest::Neighbour { code } => {
                    let result = fetch_within(source.as_ref(), &code, deadline).await;
                    Event::NeighbourLoaded { code, result }
                }
            };
            if events.send(event).is_err() {
                debug!("explorer gone, dropping fetch result");
            }
        });
    })
}

async fn fetch_within(
    source: &dyn ZoneSource,
    code: &PostalCode,
    deadline: Duration,
) -> Result<ZoneFeature, FetchError> {
    match tokio::time::timeout(deadline, source.fetch_feature(code.as_str())).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::TimedOut {
            code: code.to_string(),
            seconds: deadline.as_secs_f64(),
        }),
    }
}

/// Notification contract: every notification becomes a later event.
pub fn notifier(events: UnboundedSender<Event>) -> Notify {
    Rc::new(move |event: Event| {
        if events.send(event).is_err() {
            debug!("explorer gone, dropping notification");
        }
    })
}

pub struct Explorer<B: ViewBinding> {
    controller: ExplorationController,
    events: UnboundedReceiver<Event>,
    sender: UnboundedSender<Event>,
    catalog: ZoneCatalog,
    binding: B,
    presented: Presented,
}

impl<B: ViewBinding> Explorer<B> {
    pub fn new(settings: MapConfig, deadline: Duration, source: Arc<dyn ZoneSource>, binding: B) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        let controller = ExplorationController::new(
            settings,
            fetcher(source, sender.clone(), deadline),
            notifier(sender.clone()),
        );
        Self {
            controller,
            events,
            sender,
            catalog: ZoneCatalog::default(),
            binding,
            presented: Presented::default(),
        }
    }

    /// Loads the search-assist list. A failure leaves the list empty.
    pub async fn load_catalog(&mut self, source: &dyn ZoneSource) {
        match source.fetch_catalog().await {
            Ok(catalog) => {
                debug!(zones = catalog.zones.len(), "catalog loaded");
                self.catalog = catalog;
            }
            Err(e) => warn!(error = %e, "zone catalog unavailable"),
        }
    }

    pub fn sender(&self) -> UnboundedSender<Event> {
        self.sender.clone()
    }

    /// Handles one event and pushes whatever changed. Returns `false` once asked to quit.
    pub fn dispatch(&mut self, event: Event) -> io::Result<bool> {
        match event {
            Event::Command(Command::Quit) => return Ok(false),
            Event::Command(Command::Suggest(prefix)) => {
                let options: Vec<_> = self.catalog.suggest(&prefix).take(20).collect();
                self.binding.render_suggestions(&options)?;
            }
            Event::Command(Command::Show) => self.presented.invalidate(),
            Event::Command(Command::Help) => self.binding.render_help()?,
            event => self.controller.handle(event),
        }
        self.presented.refresh(&self.controller, &mut self.binding)?;
        Ok(true)
    }

    /// Waits for the next event and dispatches it. Returns `false` on quit or when every
    /// sender is gone.
    pub async fn step(&mut self) -> io::Result<bool> {
        match self.events.recv().await {
            Some(event) => self.dispatch(event),
            None => Ok(false),
        }
    }

    pub async fn run(mut self) -> io::Result<()> {
        self.presented.refresh(&self.controller, &mut self.binding)?;
        while self.step().await? {}
        Ok(())
    }

    pub fn controller(&self) -> &ExplorationController {
        &self.controller
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }
}

/// Forwards parsed input lines as command events; end of input quits. Blocking, so it
/// runs on its own thread.
pub fn read_commands<R: BufRead>(input: R, events: UnboundedSender<Event>) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = parse_command(&line).unwrap_or(Command::Help);
        if events.send(Event::Command(command)).is_err() {
            return Ok(());
        }
    }
    let _ = events.send(Event::Command(Command::Quit));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::TerminalBinding;
    use crate::config::StyleConfig;
    use crate::map::ZoneStyle;
    use crate::types::{fixtures, Zone, ZoneOption};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MemorySource {
        features: HashMap<String, ZoneFeature>,
        // never answers for this code
        stalled: Option<String>,
        requests: AtomicUsize,
    }

    impl MemorySource {
        fn with(features: Vec<ZoneFeature>) -> Self {
            Self {
                features: features
                    .into_iter()
                    .map(|f| (f.zone.postal_code.to_string(), f))
                    .collect(),
                stalled: None,
                requests: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ZoneSource for MemorySource {
        async fn fetch_zone(&self, code: &str) -> Result<Zone, FetchError> {
            self.fetch_feature(code).await.map(|f| f.zone)
        }

        async fn fetch_feature(&self, code: &str) -> Result<ZoneFeature, FetchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.stalled.as_deref() == Some(code) {
                return std::future::pending().await;
            }
            self.features.get(code).cloned().ok_or_else(|| FetchError::Status {
                path: format!("/api/geo/{code}.geojson"),
                status: 404,
            })
        }

        async fn fetch_catalog(&self) -> Result<ZoneCatalog, FetchError> {
            Ok(ZoneCatalog {
                zones: vec![ZoneOption { label: "10115 (Place 10115)".into(), value: "10115".into() }],
            })
        }
    }

    fn explorer(source: Arc<MemorySource>) -> Explorer<TerminalBinding<Vec<u8>>> {
        Explorer::new(
            MapConfig::default(),
            Duration::from_secs(5),
            source,
            TerminalBinding::new(Vec::new(), StyleConfig::default()),
        )
    }

    fn search(code: &str) -> Event {
        Event::Command(Command::Search(code.to_string()))
    }

    #[tokio::test]
    async fn test_search_then_neighbours_arrive() {
        let source = Arc::new(MemorySource::with(vec![
            fixtures::feature(fixtures::with_neighbours(fixtures::zone("10115", 20313), &["10117"])),
            fixtures::feature(fixtures::zone("10117", 100)),
        ]));
        let mut explorer = explorer(Arc::clone(&source));

        assert!(explorer.dispatch(search("10115")).unwrap());
        assert!(explorer.step().await.unwrap());
        assert_eq!(explorer.controller().info().fields().postal_code, "10115");

        assert!(explorer.step().await.unwrap());
        let map = explorer.controller().map();
        assert_eq!(map.style_of("10115"), Some(ZoneStyle::Viewed));
        assert_eq!(map.style_of("10117"), Some(ZoneStyle::Default));
        assert_eq!(source.requests.load(Ordering::SeqCst), 2);

        let text = String::from_utf8(explorer.binding().get_ref().clone()).unwrap();
        assert!(text.contains("20,313"));
        assert!(text.contains("#8a2be2"));
    }

    #[tokio::test]
    async fn test_failed_search_leaves_views_alone() {
        let source = Arc::new(MemorySource::with(vec![fixtures::feature(fixtures::zone("10115", 1))]));
        let mut explorer = explorer(source);

        explorer.dispatch(search("99999")).unwrap();
        explorer.step().await.unwrap();
        assert_eq!(explorer.controller().info().fields().postal_code, "");
        assert!(!explorer.controller().is_searching());

        explorer.dispatch(search("10115")).unwrap();
        explorer.step().await.unwrap();
        assert_eq!(explorer.controller().info().fields().postal_code, "10115");
    }

    #[tokio::test]
    async fn test_stalled_lookup_times_out_and_releases_search() {
        let source = Arc::new(MemorySource {
            stalled: Some("10115".into()),
            ..MemorySource::with(vec![fixtures::feature(fixtures::zone("10117", 5))])
        });
        let mut explorer = Explorer::new(
            MapConfig::default(),
            Duration::from_millis(20),
            source,
            TerminalBinding::new(Vec::new(), StyleConfig::default()),
        );

        explorer.dispatch(search("10115")).unwrap();
        assert!(explorer.controller().is_searching());
        explorer.step().await.unwrap();
        assert!(!explorer.controller().is_searching());
        assert_eq!(explorer.controller().info().fields().postal_code, "");

        explorer.dispatch(search("10117")).unwrap();
        explorer.step().await.unwrap();
        assert_eq!(explorer.controller().info().fields().postal_code, "10117");
    }

    #[tokio::test]
    async fn test_stalled_neighbour_is_fetched_again() {
        let source = Arc::new(MemorySource {
            stalled: Some("10117".into()),
            ..MemorySource::with(vec![fixtures::feature(fixtures::with_neighbours(
                fixtures::zone("10115", 5),
                &["10117"],
            ))])
        });
        let mut explorer = Explorer::new(
            MapConfig::default(),
            Duration::from_millis(20),
            Arc::clone(&source) as Arc<dyn ZoneSource>,
            TerminalBinding::new(Vec::new(), StyleConfig::default()),
        );

        for _ in 0..2 {
            explorer.dispatch(search("10115")).unwrap();
            explorer.step().await.unwrap(); // primary lookup
            explorer.step().await.unwrap(); // neighbour times out
            assert_eq!(explorer.controller().map().style_of("10117"), None);
        }

        // 10115 and 10117 once per round: the timed-out neighbour was not left pending
        assert_eq!(source.requests.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_delete_notification_round_trips() {
        let source = Arc::new(MemorySource::with(vec![fixtures::feature(fixtures::zone("10115", 7))]));
        let mut explorer = explorer(source);
        explorer.dispatch(search("10115")).unwrap();
        explorer.step().await.unwrap();
        explorer.dispatch(Event::Command(Command::Add)).unwrap();
        assert_eq!(explorer.controller().map().style_of("10115"), Some(ZoneStyle::Viewed));

        explorer.dispatch(Event::Command(Command::Delete("10115".into()))).unwrap();
        explorer.step().await.unwrap();

        assert!(explorer.controller().ledger().is_empty());
        assert!(explorer.controller().info().add_enabled());
    }

    #[tokio::test]
    async fn test_catalog_and_quit() {
        let source = Arc::new(MemorySource::default());
        let mut explorer = explorer(Arc::clone(&source));
        explorer.load_catalog(source.as_ref()).await;

        assert!(explorer.dispatch(Event::Command(Command::Suggest("101".into()))).unwrap());
        assert!(!explorer.dispatch(Event::Command(Command::Quit)).unwrap());
        let text = String::from_utf8(explorer.binding().get_ref().clone()).unwrap();
        assert!(text.contains("10115 (Place 10115)"));
    }

    #[test]
    fn test_read_commands_ends_with_quit() {
        let (sender, mut events) = mpsc::unbounded_channel();
        let input: &[u8] = b"search 10115\n\nbogus words\n";
        read_commands(input, sender).unwrap();

        let mut commands = Vec::new();
        while let Ok(Event::Command(command)) = events.try_recv() {
            commands.push(command);
        }
        assert_eq!(
            commands,
            vec![Command::Search("10115".into()), Command::Help, Command::Quit]
        );
    }
}
