//! In-app navigation without full page reloads.
//!
//! A navigation moves through `Idle -> Loading -> Swapping -> Idle`. The target page starts
//! loading while the old page is still displayed. The current-page descriptor is replaced
//! right away, and only then is the loader's [`Ready`] signal released, so the loader never
//! renders before the descriptor has moved. Once the load resolves, the [`Synchronizer`]
//! re-establishes live updates for the new page.
//!
//! Only the latest navigation counts. An older navigation that resolves after a newer one has
//! started leaves no trace: no synchronization, no history entry, and it does not touch the
//! loading indicator.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::oneshot;
use url::Url;

use crate::config::NavigationConfig;
use crate::page::{PageDescriptor, ParseError};

/// Links handled by [`Navigator::handle_click`]; everything else is left to the browser.
pub const HISTORY_LINK_SELECTOR: &str = "a.history, a.history img";

#[derive(Debug, Error)]
pub enum NavError {
    #[error(transparent)]
    MalformedUrl(#[from] ParseError),
    #[error("page load failed: {0:#}")]
    Load(anyhow::Error),
    #[error("page load timed out after {}", humantime::format_duration(*.0))]
    Timeout(Duration),
    #[error("synchronization failed: {0:#}")]
    Synchronize(anyhow::Error),
    #[error("navigation superseded by a newer one")]
    Superseded,
}

/// Loads and renders a page.
pub trait PageLoader {
    /// Fetches `page` and renders it. Implementations may fetch right away but must await
    /// [`Ready::wait`] before touching the displayed page, and must resolve only once the new
    /// page is fully rendered.
    fn load(&self, page: &PageDescriptor, ready: Ready)
        -> impl Future<Output = anyhow::Result<()>>;
}

/// Re-establishes live updates (subscriptions, streams) after a page swap.
pub trait Synchronizer {
    fn synchronize(&self) -> impl Future<Output = anyhow::Result<()>>;
}

pub trait History {
    fn push_state(&self, href: &str);
}

pub trait Ui {
    fn set_loading(&self, loading: bool);
    /// Shows a failed navigation to the user.
    fn alert(&self, err: &NavError);
}

/// One-shot permission for a loader to start rendering.
#[derive(Debug)]
pub struct Ready {
    rx: Option<oneshot::Receiver<()>>,
    generation: u64,
    latest: Arc<AtomicU64>,
}

impl Ready {
    /// Resolves once the page descriptor has been swapped. Fails with
    /// [`NavError::Superseded`] if the navigation was dropped, or if a newer one has started
    /// by the time the signal arrives. Loaders must not render after an error.
    pub async fn wait(&mut self) -> Result<(), NavError> {
        if let Some(rx) = self.rx.take() {
            rx.await.map_err(|_| NavError::Superseded)?;
        }
        if !self.is_current() {
            return Err(NavError::Superseded);
        }
        Ok(())
    }

    /// Whether this is still the latest navigation. Loaders doing long renders can check this
    /// to stop early.
    pub fn is_current(&self) -> bool {
        self.latest.load(Ordering::SeqCst) == self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavState {
    Idle,
    Loading,
    Swapping,
}

/// What started a navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Click,
    /// Browser back/forward. The browser already moved its history, so nothing is pushed.
    History,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub fn any(&self) -> bool {
        self.ctrl || self.meta || self.shift || self.alt
    }
}

/// A click on a link matching [`HISTORY_LINK_SELECTOR`].
#[derive(Debug, Clone)]
pub struct Click {
    pub href: String,
    pub modifiers: Modifiers,
}

impl Click {
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            modifiers: Modifiers::default(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Synchronous verdict on a click. The caller prevents the browser's default action only
/// for [`Intercept::Navigate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Intercept {
    /// Modifier held or foreign origin: let the browser handle it.
    PassThrough,
    /// Same page, at most a different fragment: let the browser scroll.
    SamePage,
    Navigate(PageDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    PassThrough,
    SamePage,
    Navigated,
    /// A newer navigation took over before this one finished.
    Superseded,
    /// The link did not name a page. Nothing changed; the error was logged and shown.
    Rejected,
    /// Loading or synchronizing failed. The error was logged and shown.
    Failed,
}

impl Outcome {
    /// Whether the browser's default action was taken over, i.e. a navigation started.
    pub fn default_prevented(&self) -> bool {
        matches!(self, Outcome::Navigated | Outcome::Superseded | Outcome::Failed)
    }
}

/// Read access to the current page, for components outside the navigator.
#[derive(Debug, Clone)]
pub struct CurrentPage(Arc<RwLock<PageDescriptor>>);

impl CurrentPage {
    pub fn get(&self) -> PageDescriptor {
        self.0.read().clone()
    }

    pub fn matches(&self, other: &PageDescriptor) -> bool {
        self.0.read().matches(other)
    }
}

pub struct Options<L, S, H, U> {
    /// Origin the client is served from, e.g. `https://example.org`.
    pub origin: String,
    /// Href of the page displayed at startup.
    pub initial_href: String,
    pub loader: L,
    pub synchronizer: S,
    pub history: H,
    pub ui: U,
    pub config: NavigationConfig,
}

/// Owns the current page and drives every navigation.
pub struct Navigator<L, S, H, U> {
    loader: L,
    synchronizer: S,
    history: H,
    ui: U,
    origin: Url,
    cfg: NavigationConfig,
    current: CurrentPage,
    /// Last page that finished loading and synchronizing; the rollback target.
    committed: Mutex<PageDescriptor>,
    state: Mutex<NavState>,
    latest: Arc<AtomicU64>,
}

impl<L, S, H, U> Navigator<L, S, H, U>
where
    L: PageLoader,
    S: Synchronizer,
    H: History,
    U: Ui,
{
    pub fn new(options: Options<L, S, H, U>) -> anyhow::Result<Self> {
        let origin = Url::parse(&options.origin)
            .with_context(|| format!("navigation: parse origin {:?}", options.origin))?;
        let initial = origin
            .join(&options.initial_href)
            .map_err(|err| ParseError::new(&options.initial_href, err.to_string()))
            .and_then(|url| PageDescriptor::from_url(&url))
            .context("navigation: parse initial page")?;
        tracing::debug!("Navigator starting at {initial}");

        Ok(Self {
            loader: options.loader,
            synchronizer: options.synchronizer,
            history: options.history,
            ui: options.ui,
            origin,
            cfg: options.config,
            committed: Mutex::new(initial.clone()),
            current: CurrentPage(Arc::new(RwLock::new(initial))),
            state: Mutex::new(NavState::Idle),
            latest: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn current(&self) -> PageDescriptor {
        self.current.get()
    }

    pub fn current_page(&self) -> CurrentPage {
        self.current.clone()
    }

    pub fn state(&self) -> NavState {
        *self.state.lock()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn synchronizer(&self) -> &S {
        &self.synchronizer
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn ui(&self) -> &U {
        &self.ui
    }

    /// Decides what to do with a click without any side effects.
    pub fn intercept(&self, click: &Click) -> Result<Intercept, NavError> {
        if click.modifiers.any() {
            return Ok(Intercept::PassThrough);
        }
        let url = self.resolve(&click.href)?;
        if url.origin() != self.origin.origin() {
            return Ok(Intercept::PassThrough);
        }
        let target = PageDescriptor::from_url(&url)?;
        if self.current.matches(&target) {
            return Ok(Intercept::SamePage);
        }
        Ok(Intercept::Navigate(target))
    }

    /// Top-level click handler. Never fails: errors are logged and shown through [`Ui::alert`].
    #[tracing::instrument(skip_all, fields(href = %click.href))]
    pub async fn handle_click(&self, click: &Click) -> Outcome {
        match self.intercept(click) {
            Ok(Intercept::PassThrough) => Outcome::PassThrough,
            Ok(Intercept::SamePage) => {
                tracing::debug!("Link points at the current page");
                Outcome::SamePage
            }
            Ok(Intercept::Navigate(target)) => self.run(target, Trigger::Click).await,
            Err(err) => {
                self.report(&err);
                Outcome::Rejected
            }
        }
    }

    /// Top-level handler for browser back/forward events.
    #[tracing::instrument(skip(self))]
    pub async fn handle_pop_state(&self, href: &str) -> Outcome {
        let target = match self
            .resolve(href)
            .and_then(|url| Ok(PageDescriptor::from_url(&url)?))
        {
            Ok(target) => target,
            Err(err) => {
                self.report(&err);
                return Outcome::Rejected;
            }
        };
        self.run(target, Trigger::History).await
    }

    async fn run(&self, target: PageDescriptor, trigger: Trigger) -> Outcome {
        match self.navigate(target, trigger).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report(&err);
                Outcome::Failed
            }
        }
    }

    /// Navigates to `target`, returning once the new page is rendered and synchronized.
    pub async fn navigate(
        &self,
        target: PageDescriptor,
        trigger: Trigger,
    ) -> Result<Outcome, NavError> {
        if self.current.matches(&target) {
            return Ok(Outcome::SamePage);
        }

        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Navigating to {target} ({trigger:?}, #{generation})");
        self.set_state(NavState::Loading);
        self.ui.set_loading(true);

        let (release, rx) = oneshot::channel();
        let ready = Ready {
            rx: Some(rx),
            generation,
            latest: self.latest.clone(),
        };
        let load = tokio::time::timeout(self.cfg.load_timeout, self.loader.load(&target, ready));
        let commit = async {
            self.replace_current(target.clone());
            // The load may already have failed and dropped its receiver.
            let _ = release.send(());
        };
        let (loaded, ()) = tokio::join!(load, commit);

        let loaded = match loaded {
            Ok(result) => result.map_err(NavError::Load),
            Err(_) => Err(NavError::Timeout(self.cfg.load_timeout)),
        };
        if let Err(err) = loaded {
            return self.fail(generation, err);
        }
        if !self.is_latest(generation) {
            tracing::debug!("Navigation #{generation} to {target} superseded after load");
            return Ok(Outcome::Superseded);
        }

        self.set_state(NavState::Swapping);
        if let Err(err) = self.synchronizer.synchronize().await {
            return self.fail(generation, NavError::Synchronize(err));
        }
        if !self.is_latest(generation) {
            tracing::debug!("Navigation #{generation} to {target} superseded after sync");
            return Ok(Outcome::Superseded);
        }

        if trigger == Trigger::Click {
            self.history.push_state(target.href());
        }
        *self.committed.lock() = target.clone();
        self.set_state(NavState::Idle);
        self.ui.set_loading(false);
        tracing::info!("Navigated to {target}");
        Ok(Outcome::Navigated)
    }

    fn fail(&self, generation: u64, err: NavError) -> Result<Outcome, NavError> {
        if !self.is_latest(generation) {
            tracing::debug!("Ignoring failure of superseded navigation #{generation}: {err}");
            return Ok(Outcome::Superseded);
        }
        if self.cfg.rollback_on_failure {
            let previous = self.committed.lock().clone();
            tracing::warn!("Restoring {previous} after failed navigation");
            self.replace_current(previous);
        }
        self.set_state(NavState::Idle);
        self.ui.set_loading(false);
        Err(err)
    }

    fn report(&self, err: &NavError) {
        tracing::error!("Navigation failed: {err}");
        self.ui.alert(err);
    }

    fn resolve(&self, href: &str) -> Result<Url, NavError> {
        self.origin
            .join(href)
            .map_err(|err| NavError::MalformedUrl(ParseError::new(href, err.to_string())))
    }

    fn replace_current(&self, next: PageDescriptor) {
        *self.current.0.write() = next;
    }

    fn set_state(&self, state: NavState) {
        *self.state.lock() = state;
    }

    fn is_latest(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, event: impl Into<String>) {
        log.lock().push(event.into());
    }

    #[derive(Default)]
    struct TestLoader {
        log: Log,
        fail: bool,
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
        page: Mutex<Option<CurrentPage>>,
    }

    impl PageLoader for TestLoader {
        async fn load(&self, page: &PageDescriptor, mut ready: Ready) -> anyhow::Result<()> {
            push(&self.log, format!("load {}", page.href()));
            let gate = self.gates.lock().remove(page.href());
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            ready.wait().await?;
            let seen = self
                .page
                .lock()
                .as_ref()
                .map(|current| current.get().href().to_string())
                .unwrap_or_default();
            push(&self.log, format!("render {} (current {seen})", page.href()));
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestSync {
        log: Log,
        fail: bool,
    }

    impl Synchronizer for TestSync {
        async fn synchronize(&self) -> anyhow::Result<()> {
            push(&self.log, "sync");
            if self.fail {
                anyhow::bail!("socket closed");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestHistory {
        log: Log,
    }

    impl History for TestHistory {
        fn push_state(&self, href: &str) {
            push(&self.log, format!("push {href}"));
        }
    }

    #[derive(Default)]
    struct TestUi {
        log: Log,
    }

    impl Ui for TestUi {
        fn set_loading(&self, loading: bool) {
            push(&self.log, format!("loading {loading}"));
        }

        fn alert(&self, err: &NavError) {
            push(&self.log, format!("alert {err}"));
        }
    }

    type TestNavigator = Navigator<TestLoader, TestSync, TestHistory, TestUi>;

    #[derive(Default)]
    struct Setup {
        fail_load: bool,
        fail_sync: bool,
        config: NavigationConfig,
    }

    fn navigator(setup: Setup) -> (TestNavigator, Log) {
        let log = Log::default();
        let nav = Navigator::new(Options {
            origin: "https://example.org".into(),
            initial_href: "/a/1".into(),
            loader: TestLoader {
                log: log.clone(),
                fail: setup.fail_load,
                ..TestLoader::default()
            },
            synchronizer: TestSync {
                log: log.clone(),
                fail: setup.fail_sync,
            },
            history: TestHistory { log: log.clone() },
            ui: TestUi { log: log.clone() },
            config: setup.config,
        })
        .unwrap();
        *nav.loader().page.lock() = Some(nav.current_page());
        (nav, log)
    }

    fn events(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    #[tokio::test]
    async fn click_runs_full_transition_in_order() {
        let (nav, log) = navigator(Setup::default());
        let outcome = nav.handle_click(&Click::new("/a/2#p7")).await;
        assert_eq!(outcome, Outcome::Navigated);
        assert!(outcome.default_prevented());
        assert_eq!(
            events(&log),
            vec![
                "loading true",
                "load /a/2#p7",
                "render /a/2#p7 (current /a/2#p7)",
                "sync",
                "push /a/2#p7",
                "loading false",
            ]
        );
        assert_eq!(nav.current().thread(), Some(2));
        assert_eq!(nav.state(), NavState::Idle);
    }

    #[tokio::test]
    async fn same_page_click_is_a_no_op() {
        let (nav, log) = navigator(Setup::default());
        assert_eq!(
            nav.intercept(&Click::new("https://example.org/a/1#p3")).unwrap(),
            Intercept::SamePage
        );
        let outcome = nav.handle_click(&Click::new("/a/1?foo=1#p3")).await;
        assert_eq!(outcome, Outcome::SamePage);
        assert!(!outcome.default_prevented());
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn modified_and_foreign_clicks_pass_through() {
        let (nav, log) = navigator(Setup::default());
        let ctrl = Modifiers {
            ctrl: true,
            ..Modifiers::default()
        };
        assert_eq!(
            nav.handle_click(&Click::new("/a/2").with_modifiers(ctrl)).await,
            Outcome::PassThrough
        );
        assert_eq!(
            nav.handle_click(&Click::new("https://elsewhere.org/a/2")).await,
            Outcome::PassThrough
        );
        assert!(events(&log).is_empty());
    }

    #[tokio::test]
    async fn malformed_url_aborts_before_any_state_change() {
        let (nav, log) = navigator(Setup::default());
        let outcome = nav.handle_click(&Click::new("/a/b/c")).await;
        assert_eq!(outcome, Outcome::Rejected);
        assert!(!outcome.default_prevented());
        let events = events(&log);
        assert_eq!(events.len(), 1);
        assert!(events[0].starts_with("alert malformed URL"));
        assert_eq!(nav.current().href(), "/a/1");
    }

    #[tokio::test]
    async fn load_failure_is_reported_and_rolled_back() {
        let (nav, log) = navigator(Setup {
            fail_load: true,
            ..Setup::default()
        });
        let outcome = nav.handle_click(&Click::new("/a/2")).await;
        assert_eq!(outcome, Outcome::Failed);
        assert!(outcome.default_prevented());
        let events = events(&log);
        assert_eq!(events[0], "loading true");
        assert_eq!(events[events.len() - 2], "loading false");
        assert_eq!(events[events.len() - 1], "alert page load failed: boom");
        assert!(!events.iter().any(|e| e == "sync" || e.starts_with("push")));
        assert_eq!(nav.current().href(), "/a/1");
        assert_eq!(nav.state(), NavState::Idle);
    }

    #[tokio::test]
    async fn load_failure_keeps_descriptor_without_rollback() {
        let (nav, _log) = navigator(Setup {
            fail_load: true,
            config: NavigationConfig {
                rollback_on_failure: false,
                ..NavigationConfig::default()
            },
            ..Setup::default()
        });
        assert_eq!(nav.handle_click(&Click::new("/a/2")).await, Outcome::Failed);
        assert_eq!(nav.current().thread(), Some(2));
    }

    #[tokio::test]
    async fn sync_failure_hides_indicator_after_sync_settles() {
        let (nav, log) = navigator(Setup {
            fail_sync: true,
            ..Setup::default()
        });
        assert_eq!(nav.handle_click(&Click::new("/a/2")).await, Outcome::Failed);
        let events = events(&log);
        let sync = events.iter().position(|e| e == "sync").unwrap();
        let hidden = events.iter().position(|e| e == "loading false").unwrap();
        assert!(sync < hidden);
        assert_eq!(
            events.last().unwrap(),
            "alert synchronization failed: socket closed"
        );
        assert!(!events.iter().any(|e| e.starts_with("push")));
    }

    #[tokio::test]
    async fn pop_state_does_not_push_history() {
        let (nav, log) = navigator(Setup::default());
        assert_eq!(
            nav.handle_pop_state("https://example.org/b/").await,
            Outcome::Navigated
        );
        assert!(!events(&log).iter().any(|e| e.starts_with("push")));
        assert_eq!(nav.current().board(), "b");
        assert_eq!(nav.handle_pop_state("/b/#top").await, Outcome::SamePage);
    }

    #[tokio::test]
    async fn slow_load_times_out() {
        let (nav, log) = navigator(Setup {
            config: NavigationConfig {
                load_timeout: Duration::from_millis(20),
                ..NavigationConfig::default()
            },
            ..Setup::default()
        });
        let (_hold, gate) = oneshot::channel::<()>();
        nav.loader().gates.lock().insert("/a/2".into(), gate);
        assert_eq!(nav.handle_click(&Click::new("/a/2")).await, Outcome::Failed);
        assert_eq!(
            events(&log).last().unwrap(),
            "alert page load timed out after 20ms"
        );
        assert_eq!(nav.current().href(), "/a/1");
    }

    #[tokio::test]
    async fn latest_navigation_wins() {
        let (nav, log) = navigator(Setup::default());
        let (release_first, gate) = oneshot::channel();
        nav.loader().gates.lock().insert("/a/2".into(), gate);

        let click_a = Click::new("/a/2");
        let click_b = Click::new("/a/3");
        let first = nav.handle_click(&click_a);
        let second = async {
            tokio::task::yield_now().await;
            let outcome = nav.handle_click(&click_b).await;
            let _ = release_first.send(());
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Outcome::Superseded);
        assert_eq!(second, Outcome::Navigated);
        assert_eq!(nav.current().thread(), Some(3));
        let events = events(&log);
        assert!(
            !events.iter().any(|e| e.starts_with("render /a/2")),
            "stale page rendered: {events:?}"
        );
        assert_eq!(events.iter().filter(|e| *e == "sync").count(), 1);
        assert_eq!(
            events.iter().filter(|e| e.starts_with("push")).collect::<Vec<_>>(),
            vec!["push /a/3"]
        );
        assert_eq!(events.iter().filter(|e| *e == "loading false").count(), 1);
    }

    #[tokio::test]
    async fn failure_after_supersede_restores_last_rendered_page() {
        let (nav, log) = navigator(Setup {
            fail_load: true,
            ..Setup::default()
        });
        let (release_first, gate) = oneshot::channel();
        nav.loader().gates.lock().insert("/a/2".into(), gate);

        let click_a = Click::new("/a/2");
        let click_b = Click::new("/a/3");
        let first = nav.handle_click(&click_a);
        let second = async {
            tokio::task::yield_now().await;
            let outcome = nav.handle_click(&click_b).await;
            let _ = release_first.send(());
            outcome
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first, Outcome::Superseded);
        assert_eq!(second, Outcome::Failed);
        assert_eq!(nav.current().href(), "/a/1");
        assert!(!events(&log).iter().any(|e| e.starts_with("render /a/2")));
        assert!(matches!(
            nav.intercept(&click_a).unwrap(),
            Intercept::Navigate(_)
        ));
    }

    #[tokio::test]
    async fn ready_refuses_stale_navigation() {
        let (tx, rx) = oneshot::channel::<()>();
        let latest = Arc::new(AtomicU64::new(1));
        let mut ready = Ready {
            rx: Some(rx),
            generation: 1,
            latest: latest.clone(),
        };
        tx.send(()).unwrap();
        latest.store(2, Ordering::SeqCst);
        assert!(matches!(ready.wait().await, Err(NavError::Superseded)));
        assert!(matches!(ready.wait().await, Err(NavError::Superseded)));
    }

    #[tokio::test]
    async fn ready_reports_superseded_when_dropped() {
        let (tx, rx) = oneshot::channel::<()>();
        let latest = Arc::new(AtomicU64::new(1));
        let mut ready = Ready {
            rx: Some(rx),
            generation: 1,
            latest: latest.clone(),
        };
        assert!(ready.is_current());
        latest.store(2, Ordering::SeqCst);
        assert!(!ready.is_current());
        drop(tx);
        assert!(matches!(ready.wait().await, Err(NavError::Superseded)));
    }
}
