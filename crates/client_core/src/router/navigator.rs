//! Executes route resolutions: follows redirects, applies effects, runs
//! prefetches and drops results of superseded navigations.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::try_join_all;
use shared::domain::Theme;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{resolve, Effect, Location, Outcome, RenderPlan, RouteTree, Screen};
use crate::{cache::Resource, prefetch::DataPrefetcher, session::SessionOracle};

pub const DEFAULT_REDIRECT_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationPhase {
    Idle,
    Resolving { location: String },
    Redirecting { from: String, to: String },
    Prefetching { location: String },
    Rendered { location: String, screen: Screen },
    Errored { location: String, message: String },
}

/// The navigation generation together with the phase it last published.
///
/// Both live in one `watch` value so a phase is only ever written by the
/// generation that is current at the moment of writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStatus {
    pub generation: u64,
    pub phase: NavigationPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedScreen {
    pub location: Location,
    pub plan: RenderPlan,
    pub resources: Vec<Resource>,
    /// Locations left through redirects, in order.
    pub redirected_from: Vec<String>,
}

impl RenderedScreen {
    pub fn screen(&self) -> Screen {
        self.plan.screen
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationError {
    pub location: String,
    pub message: String,
    pub redirected_from: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Rendered(RenderedScreen),
    Errored(NavigationError),
    /// A newer navigation started before this one finished.
    Superseded,
}

impl Navigation {
    pub fn screen(&self) -> Option<Screen> {
        match self {
            Navigation::Rendered(rendered) => Some(rendered.screen()),
            _ => None,
        }
    }
}

/// Receives side effects requested by route hooks.
pub trait EffectSink: Send + Sync {
    fn apply(&self, effect: &Effect);
}

/// Holds the display theme most recently applied by the router.
#[derive(Debug, Default)]
pub struct ThemeState {
    current: Mutex<Option<Theme>>,
}

impl ThemeState {
    pub fn current(&self) -> Option<Theme> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EffectSink for ThemeState {
    fn apply(&self, effect: &Effect) {
        match effect {
            Effect::ApplyTheme(theme) => {
                let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
                if *current != Some(*theme) {
                    debug!(%theme, "theme applied");
                    *current = Some(*theme);
                }
            }
        }
    }
}

pub struct Navigator {
    tree: Arc<RouteTree>,
    session: Arc<dyn SessionOracle>,
    prefetcher: Arc<dyn DataPrefetcher>,
    effects: Arc<dyn EffectSink>,
    redirect_limit: usize,
    status: watch::Sender<NavigationStatus>,
}

impl Navigator {
    pub fn new(
        tree: Arc<RouteTree>,
        session: Arc<dyn SessionOracle>,
        prefetcher: Arc<dyn DataPrefetcher>,
        effects: Arc<dyn EffectSink>,
    ) -> Self {
        let (status, _) = watch::channel(NavigationStatus {
            generation: 0,
            phase: NavigationPhase::Idle,
        });
        Self {
            tree,
            session,
            prefetcher,
            effects,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            status,
        }
    }

    pub fn with_redirect_limit(mut self, redirect_limit: usize) -> Self {
        self.redirect_limit = redirect_limit;
        self
    }

    pub fn phase(&self) -> NavigationPhase {
        self.status.borrow().phase.clone()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<NavigationStatus> {
        self.status.subscribe()
    }

    /// Navigates to `href`, cancelling any navigation still in progress.
    pub async fn navigate(&self, href: &str) -> Navigation {
        let mut generation = 0;
        self.status.send_modify(|status| {
            status.generation += 1;
            generation = status.generation;
        });

        let mut location = Location::parse(href);
        let mut redirected_from = Vec::new();

        loop {
            if !self.publish(
                generation,
                NavigationPhase::Resolving {
                    location: location.href(),
                },
            ) {
                return Navigation::Superseded;
            }

            let session = self.session.snapshot();
            let resolution = resolve(&self.tree, &location, &session);
            for effect in &resolution.effects {
                self.effects.apply(effect);
            }

            match resolution.outcome {
                Outcome::Redirect { to } => {
                    let from = location.href();
                    redirected_from.push(from.clone());
                    if redirected_from.len() > self.redirect_limit {
                        warn!(%from, %to, limit = self.redirect_limit, "redirect limit exceeded");
                        return self.fail(
                            generation,
                            from,
                            "too many redirects".to_string(),
                            redirected_from,
                        );
                    }
                    info!(%from, %to, "redirecting");
                    if !self.publish(
                        generation,
                        NavigationPhase::Redirecting {
                            from,
                            to: to.clone(),
                        },
                    ) {
                        return Navigation::Superseded;
                    }
                    location = Location::parse(&to);
                }
                Outcome::NotFound => {
                    debug!(location = %location.href(), "no route matched");
                    let plan = RenderPlan {
                        screen: Screen::NotFound,
                        route_ids: Vec::new(),
                        params: Default::default(),
                        search: None,
                        prefetch: Vec::new(),
                    };
                    return self.render(generation, location, plan, Vec::new(), redirected_from);
                }
                Outcome::Error(message) => {
                    return self.fail(generation, location.href(), message, redirected_from);
                }
                Outcome::Render(plan) => {
                    return self
                        .prefetch_and_render(generation, location, plan, redirected_from)
                        .await;
                }
            }
        }
    }

    async fn prefetch_and_render(
        &self,
        generation: u64,
        location: Location,
        plan: RenderPlan,
        redirected_from: Vec<String>,
    ) -> Navigation {
        if plan.prefetch.is_empty() {
            return self.render(generation, location, plan, Vec::new(), redirected_from);
        }

        if !self.publish(
            generation,
            NavigationPhase::Prefetching {
                location: location.href(),
            },
        ) {
            return Navigation::Superseded;
        }
        debug!(location = %location.href(), resources = plan.prefetch.len(), "prefetching");

        let mut status_rx = self.status.subscribe();
        let loads = try_join_all(
            plan.prefetch
                .iter()
                .map(|key| self.prefetcher.ensure_cached(key)),
        );

        let result = tokio::select! {
            result = loads => result,
            _ = superseded(&mut status_rx, generation) => {
                debug!(location = %location.href(), "navigation superseded during prefetch");
                return Navigation::Superseded;
            }
        };

        if self.is_stale(generation) {
            return Navigation::Superseded;
        }

        match result {
            Ok(resources) => {
                // Effects read the session again now that its data is cached.
                let session = self.session.snapshot();
                for effect in &resolve(&self.tree, &location, &session).effects {
                    self.effects.apply(effect);
                }
                self.render(generation, location, plan, resources, redirected_from)
            }
            Err(error) => {
                warn!(location = %location.href(), %error, "prefetch failed");
                self.fail(generation, location.href(), error.to_string(), redirected_from)
            }
        }
    }

    fn render(
        &self,
        generation: u64,
        location: Location,
        plan: RenderPlan,
        resources: Vec<Resource>,
        redirected_from: Vec<String>,
    ) -> Navigation {
        if !self.publish(
            generation,
            NavigationPhase::Rendered {
                location: location.href(),
                screen: plan.screen,
            },
        ) {
            return Navigation::Superseded;
        }
        Navigation::Rendered(RenderedScreen {
            location,
            plan,
            resources,
            redirected_from,
        })
    }

    fn fail(
        &self,
        generation: u64,
        location: String,
        message: String,
        redirected_from: Vec<String>,
    ) -> Navigation {
        if !self.publish(
            generation,
            NavigationPhase::Errored {
                location: location.clone(),
                message: message.clone(),
            },
        ) {
            return Navigation::Superseded;
        }
        Navigation::Errored(NavigationError {
            location,
            message,
            redirected_from,
        })
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.status.borrow().generation != generation
    }

    /// Publishes `phase` if `generation` is still current. Returns false,
    /// leaving the status untouched, when a newer navigation has started.
    fn publish(&self, generation: u64, phase: NavigationPhase) -> bool {
        self.status.send_if_modified(|status| {
            if status.generation != generation {
                return false;
            }
            debug!(?phase, "navigation phase");
            status.phase = phase;
            true
        })
    }
}

async fn superseded(rx: &mut watch::Receiver<NavigationStatus>, generation: u64) {
    loop {
        if rx.borrow_and_update().generation != generation {
            return;
        }
        if rx.changed().await.is_err() {
            futures::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "../tests/navigator_tests.rs"]
mod tests;
