//! The interactive loop: reads commands, runs searches and ETA fetches, writes the screen.
//!
//! Everything runs on the task that calls [`App::run`]. ETA fetches in flight are polled from
//! the same `select!` that reads input, so a stop can be selected while an earlier stop's
//! fetch is still pending. Whichever finishes goes through [`SessionContext::apply`].
use std::{
    io::{self, BufRead, Write},
    num::IntErrorKind,
    ops::ControlFlow,
    thread,
};

use anyhow::Result;
use chrono_tz::Tz;
use futures::{
    FutureExt,
    future::LocalBoxFuture,
    stream::{FuturesUnordered, StreamExt},
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::{
    api::KmbApi,
    model::stop_model::{SearchRadius, SearchRadiusError},
    render::{HELP, map::MapView, render_detail, render_stop_list},
    services::{
        eta_aggregator::fetch_arrivals,
        locator::Locator,
        session_store::SessionStore,
        stop_catalog::{StopCatalog, find_nearby},
    },
    session::{DetailPane, EtaRequest, EtaResponse, SessionContext},
};

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Select(usize),
    Radius(SearchRadius),
    List,
    Help,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("unknown command {0:?}, type h for help")]
    Unknown(String),

    #[error("there is no stop with that number")]
    NoSuchStop,

    #[error(transparent)]
    Radius(#[from] SearchRadiusError),
}

pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));

    let command = match word {
        "q" | "quit" | "exit" => Command::Quit,
        "h" | "help" | "?" => Command::Help,
        "l" | "list" => Command::List,
        "r" | "radius" => Command::Radius(rest.parse()?),
        n => match n.parse::<usize>() {
            Ok(0) => return Err(CommandError::NoSuchStop),
            Ok(n) => Command::Select(n - 1),
            Err(e) if *e.kind() == IntErrorKind::PosOverflow => {
                return Err(CommandError::NoSuchStop);
            }
            Err(_) => return Err(CommandError::Unknown(line.to_string())),
        },
    };

    Ok(Some(command))
}

/// Lines of `input`, read on a thread of their own.
/// The thread stops once the receiver is dropped and the next line comes in.
pub fn read_lines<R: BufRead + Send + 'static>(input: R) -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(16);

    thread::spawn(move || {
        for line in input.lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });

    rx
}

pub struct App<'a, A, S, W> {
    api: &'a A,
    store: &'a S,
    tz: Tz,
    session: SessionContext,
    out: W,
}

impl<'a, A: KmbApi + 'a, S: SessionStore, W: Write> App<'a, A, S, W> {
    pub fn new(api: &'a A, store: &'a S, radius: SearchRadius, tz: Tz, out: W) -> Self {
        App {
            api,
            store,
            tz,
            session: SessionContext::new(radius),
            out,
        }
    }

    #[cfg(test)]
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Locates the user and lists the stops around them.
    /// Returns false if the user couldn't be located, nothing else can be done then.
    pub async fn start<L: Locator>(&mut self, locator: &L) -> Result<bool> {
        match locator.locate().await {
            Ok(position) => {
                self.session.set_position(position);
                self.search().await?;
                Ok(true)
            }
            Err(e) => {
                warn!("{e}");
                writeln!(self.out, "{}", e.user_message())?;
                Ok(false)
            }
        }
    }

    /// Lists the stops within the current radius of the user
    pub async fn search(&mut self) -> Result<()> {
        let Some(position) = self.session.position() else {
            return Ok(());
        };

        let stops = match StopCatalog::new(self.api, self.store).load().await {
            Ok(stops) => stops,
            Err(e) => {
                self.session.set_nearby(vec![]);
                writeln!(self.out, "{}", e.user_message())?;
                return Ok(());
            }
        };

        let radius = self.session.radius();
        let nearby = find_nearby(position, f64::from(radius.meters()), &stops);
        info!("{} stops within {radius} of {position}", nearby.len());

        self.session.set_nearby(nearby);
        self.write_list()
    }

    pub async fn set_radius(&mut self, radius: SearchRadius) -> Result<()> {
        self.session.set_radius(radius);
        self.search().await
    }

    /// Expands a stop. The returned request still has to be fetched.
    pub fn select(&mut self, index: usize) -> Result<Option<EtaRequest>> {
        let Some(request) = self.session.select(index) else {
            writeln!(self.out, "{}", CommandError::NoSuchStop)?;
            return Ok(None);
        };

        self.write_list()?;
        if let Some(selection) = self.session.active() {
            write!(self.out, "{}", render_detail(selection, self.tz))?;
        }

        Ok(Some(request))
    }

    pub fn fetch(&self, request: EtaRequest) -> LocalBoxFuture<'a, EtaResponse> {
        let api = self.api;

        async move {
            let result = fetch_arrivals(api, &request.stop_code).await;

            EtaResponse {
                token: request.token,
                stop_code: request.stop_code,
                result,
            }
        }
        .boxed_local()
    }

    /// Shows the arrivals and map of the selected stop, unless the user selected something
    /// else in the meantime
    pub fn complete(&mut self, response: EtaResponse) -> Result<()> {
        let Some(position) = self.session.position() else {
            return Ok(());
        };
        let radius = self.session.radius();

        let Some(selection) = self.session.apply(response) else {
            return Ok(());
        };

        if let DetailPane::Failed(e) = &selection.pane {
            warn!("{e}");
        }

        let map = MapView::new(position, selection.stop.stop.location, radius);

        write!(self.out, "{}", render_detail(selection, self.tz))?;
        write!(self.out, "{}", map.render())?;
        self.out.flush()?;

        Ok(())
    }

    fn write_list(&mut self) -> Result<()> {
        let selected = self.session.active().map(|a| a.stop.stop.code.as_str());

        write!(
            self.out,
            "{}",
            render_stop_list(self.session.nearby(), self.session.radius(), selected)
        )?;
        self.out.flush()?;

        Ok(())
    }

    /// Runs a command. Continues with a request when the command selected a stop,
    /// breaks when the user quit.
    pub async fn handle(
        &mut self,
        command: Command,
    ) -> Result<ControlFlow<(), Option<EtaRequest>>> {
        match command {
            Command::Select(index) => return self.select(index).map(ControlFlow::Continue),
            Command::Radius(radius) => self.set_radius(radius).await?,
            Command::List => self.write_list()?,
            Command::Help => write!(self.out, "{HELP}")?,
            Command::Quit => return Ok(ControlFlow::Break(())),
        }

        Ok(ControlFlow::Continue(None))
    }

    /// Reads commands until `q` or the end of input
    pub async fn run(&mut self, mut lines: mpsc::Receiver<io::Result<String>>) -> Result<()> {
        let mut pending: FuturesUnordered<LocalBoxFuture<'a, EtaResponse>> =
            FuturesUnordered::new();

        write!(self.out, "{HELP}")?;
        self.out.flush()?;

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line.transpose()? else {
                        // Input is closed, show the arrivals already on their way
                        while let Some(response) = pending.next().await {
                            self.complete(response)?;
                        }
                        break;
                    };

                    match parse_command(&line) {
                        Ok(Some(command)) => match self.handle(command).await? {
                            ControlFlow::Break(()) => break,
                            ControlFlow::Continue(Some(request)) => {
                                pending.push(self.fetch(request));
                            }
                            ControlFlow::Continue(None) => {}
                        },
                        Ok(None) => {}
                        Err(e) => writeln!(self.out, "{e}")?,
                    }
                }
                Some(response) = pending.next(), if !pending.is_empty() => {
                    self.complete(response)?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::fake::FakeKmbApi,
        model::{kmb_api_model::KmbStop, stop_model::Coordinate},
        services::{
            eta_aggregator::Arrivals,
            locator::{ConfiguredLocator, FixedLocator},
            session_store::MemorySessionStore,
        },
        utils::EARTH_RADIUS_M,
    };
    use chrono_tz::Asia::Hong_Kong;
    use futures::future::join;
    use std::{io::Read, sync::mpsc as std_mpsc, time::Duration};
    use tokio::time::timeout;

    const ORIGIN: Coordinate = Coordinate {
        latitude: 22.3193,
        longitude: 114.1694,
    };

    fn kmb_stop(code: &str, name: &str, meters_north: f64) -> KmbStop {
        KmbStop {
            stop: code.to_string(),
            name_en: name.to_string(),
            lat: (ORIGIN.latitude + (meters_north / EARTH_RADIUS_M).to_degrees()).into(),
            long: ORIGIN.longitude.into(),
        }
    }

    fn api() -> FakeKmbApi {
        let api = FakeKmbApi::with_stops(vec![
            kmb_stop("A", "FIFTY", 50.0),
            kmb_stop("B", "ONE FIFTY", 150.0),
            kmb_stop("C", "NINETY", 90.0),
        ]);
        api.set_eta_json(
            "A",
            r#"{"data": [{"route": "1A", "dir": "O", "service_type": "1", "dest_en": "STAR FERRY", "eta_seq": 1, "eta": "2024-01-27T19:02:00+08:00"}]}"#,
        );
        api.set_eta_json(
            "C",
            r#"{"data": [{"route": "2", "dir": "I", "service_type": "1", "dest_en": "SO UK", "eta_seq": 1, "eta": null}]}"#,
        );
        api
    }

    fn output(out: &[u8]) -> String {
        String::from_utf8_lossy(out).into_owned()
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("  2 "), Ok(Some(Command::Select(1))));
        assert_eq!(parse_command("r 300"), Ok(Some(Command::Radius(SearchRadius::M300))));
        assert_eq!(parse_command("radius  500m"), Ok(Some(Command::Radius(SearchRadius::M500))));
        assert_eq!(parse_command("q"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("0"), Err(CommandError::NoSuchStop));
        assert_eq!(
            parse_command("r 150"),
            Err(CommandError::Radius(SearchRadiusError::Unsupported(150)))
        );
        assert!(matches!(parse_command("nearby"), Err(CommandError::Unknown(_))));
    }

    #[test]
    fn test_parse_command_stop_number_overflow() {
        assert_eq!(
            parse_command("99999999999999999999999999"),
            Err(CommandError::NoSuchStop)
        );
        assert!(matches!(parse_command("-1"), Err(CommandError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_start_lists_stops_within_radius() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);

        assert!(app.start(&FixedLocator(ORIGIN)).await?);

        let codes: Vec<_> = app.session().nearby().iter().map(|n| n.stop.code.clone()).collect();
        assert_eq!(codes, ["A", "C"]);
        drop(app);

        assert_eq!(
            output(&out),
            "Bus stops within 100m:\n   1. Distance: 50m FIFTY\n   2. Distance: 90m NINETY\n"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_start_without_location() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);

        assert!(!app.start(&ConfiguredLocator::Unsupported).await?);
        drop(app);

        assert_eq!(output(&out), "Unable to retrieve your location\n");
        assert_eq!(api.stop_list_calls.get(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_failure_shows_error() -> Result<()> {
        let api = FakeKmbApi::default();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);

        assert!(app.start(&FixedLocator(ORIGIN)).await?);
        assert!(app.session().nearby().is_empty());
        drop(app);

        assert_eq!(output(&out), "Error fetching bus stop data\n");

        Ok(())
    }

    #[tokio::test]
    async fn test_radius_change_searches_again_from_cache() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
        app.start(&FixedLocator(ORIGIN)).await?;

        let flow = app.handle(Command::Radius(SearchRadius::M200)).await?;

        assert_eq!(flow, ControlFlow::Continue(None));
        assert_eq!(app.session().nearby().len(), 3);
        assert_eq!(api.stop_list_calls.get(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_late_response_does_not_replace_newer_selection() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
        app.start(&FixedLocator(ORIGIN)).await?;

        let request_a = app.select(0)?.unwrap();
        let fetch_a = app.fetch(request_a);
        let request_c = app.select(1)?.unwrap();
        let fetch_c = app.fetch(request_c);

        // C resolves first, then A arrives late
        let (response_a, response_c) = join(fetch_a, fetch_c).await;
        app.complete(response_c)?;
        app.complete(response_a)?;

        let active = app.session().active().unwrap();
        assert_eq!(active.stop.stop.code, "C");
        assert!(matches!(active.pane, DetailPane::Loaded(Arrivals::NoRouteInfo)));
        drop(app);

        let out = output(&out);
        let detail = "No bus route information\n\
            Map (zoom 19): https://www.openstreetmap.org/?mlat=22.320109&mlon=114.169400#map=19/22.319705/114.169400\n\
            \x20 tile https://tile.openstreetmap.org/19/428415/228783.png\n\
            \x20 [you] 22.319300,114.169400\n\
            \x20 [bus] 22.320109,114.169400\n";
        assert!(out.ends_with(detail), "{out}");
        assert!(!out.contains("STAR FERRY"));

        Ok(())
    }

    #[tokio::test]
    async fn test_eta_failure_still_renders_map() -> Result<()> {
        let api = FakeKmbApi::with_stops(vec![kmb_stop("X", "NO ETA", 10.0)]);
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
        app.start(&FixedLocator(ORIGIN)).await?;

        let request = app.select(0)?.unwrap();
        let response = app.fetch(request).await;
        app.complete(response)?;
        drop(app);

        let out = output(&out);
        assert!(out.contains("Error fetching ETA data\nMap (zoom 19)"), "{out}");

        Ok(())
    }

    #[tokio::test]
    async fn test_run_selects_and_renders() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
        app.start(&FixedLocator(ORIGIN)).await?;

        let input: &[u8] = b"1\n";
        app.run(read_lines(input)).await?;

        let active = app.session().active().unwrap();
        assert_eq!(active.stop.stop.code, "A");
        assert!(matches!(
            &active.pane,
            DetailPane::Loaded(Arrivals::Routes(routes)) if routes[0].route == "1A"
        ));
        assert_eq!(api.stop_eta_calls.borrow().as_slice(), ["A"]);
        drop(app);

        let out = output(&out);
        assert!(out.contains(">  1. Distance: 50m FIFTY\n"), "{out}");
        assert!(out.contains("1A  STAR FERRY  07:02 PM\n"), "{out}");

        Ok(())
    }

    #[tokio::test]
    async fn test_quit_stops_reading() -> Result<()> {
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];
        let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
        app.start(&FixedLocator(ORIGIN)).await?;

        let input: &[u8] = b"q\n1\n";
        app.run(read_lines(input)).await?;

        assert!(app.session().active().is_none());
        assert!(api.stop_eta_calls.borrow().is_empty());

        Ok(())
    }

    /// Blocks in `read` until its sender is dropped, like a terminal nobody types into
    struct SilentInput(std_mpsc::Receiver<()>);

    impl Read for SilentInput {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            _ = self.0.recv();
            Ok(0)
        }
    }

    #[test]
    fn test_session_can_be_dropped_while_input_is_silent() -> Result<()> {
        let (hold_open, silent) = std_mpsc::channel::<()>();
        let api = api();
        let store = MemorySessionStore::default();
        let mut out = vec![];

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let finished = runtime.block_on(async {
            let mut app = App::new(&api, &store, SearchRadius::M100, Hong_Kong, &mut out);
            app.start(&FixedLocator(ORIGIN)).await?;

            let lines = read_lines(io::BufReader::new(SilentInput(silent)));
            Ok::<_, anyhow::Error>(timeout(Duration::from_millis(50), app.run(lines)).await.is_ok())
        })?;

        // The reader thread is still blocked, dropping the runtime must not wait for it
        drop(runtime);
        drop(hold_open);

        assert!(!finished);
        assert!(output(&out).ends_with(HELP), "{}", output(&out));

        Ok(())
    }
}
