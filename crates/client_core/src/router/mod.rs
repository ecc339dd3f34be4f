//! Guarded route graph.
//!
//! Routes are plain records in an arena. [`resolve`] walks the matched chain
//! root-to-leaf and decides, without performing any I/O, whether to redirect,
//! which screen to show and which resources to prefetch first.

use std::collections::BTreeMap;

use shared::{
    domain::Theme,
    error::ValidationError,
    protocol::{ResetPasswordParams, SearchParams, VerifyEmailParams},
};
use url::form_urlencoded;

use crate::{cache::ResourceKey, session::SessionState};

mod navigator;
pub mod routes;

pub use navigator::{
    EffectSink, Navigation, NavigationError, NavigationPhase, NavigationStatus, Navigator,
    RenderedScreen, ThemeState, DEFAULT_REDIRECT_LIMIT,
};

pub type RouteParams = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub search: SearchParams,
}

impl Location {
    pub fn parse(href: &str) -> Self {
        let href = href.trim();
        let href = href.split('#').next().unwrap_or_default();
        let (path, query) = href.split_once('?').unwrap_or((href, ""));
        Self {
            path: normalize_path(path),
            search: form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect(),
        }
    }

    pub fn segments(&self) -> Vec<&str> {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }

    pub fn href(&self) -> String {
        if self.search.is_empty() {
            return self.path.clone();
        }
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.search)
            .finish();
        format!("{}?{query}", self.path)
    }
}

/// Collapses duplicate and trailing slashes: `//tasks/` -> `/tasks`.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Root,
    /// Layout node that groups children without consuming a path segment.
    Group,
    /// Matches only when no path segments remain.
    Index,
    Static(&'static str),
    Param(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Home,
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    VerifyEmail,
    TaskList,
    Settings,
    NewTask,
    EditTask,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedSearch {
    VerifyEmail(VerifyEmailParams),
    ResetPassword(ResetPasswordParams),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ApplyTheme(Theme),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
}

impl Redirect {
    pub fn to(path: impl Into<String>) -> Self {
        Self { to: path.into() }
    }
}

pub struct GuardContext<'a> {
    pub session: &'a SessionState,
    pub location: &'a Location,
    pub params: &'a RouteParams,
}

pub type Guard = fn(&GuardContext<'_>) -> Result<(), Redirect>;
pub type Prefetch = fn(&GuardContext<'_>) -> Result<Option<ResourceKey>, Redirect>;
pub type SearchValidator = fn(&SearchParams) -> Result<ValidatedSearch, ValidationError>;
pub type EffectHook = fn(&GuardContext<'_>) -> Option<Effect>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

pub struct RouteNode {
    pub id: &'static str,
    pub segment: Segment,
    pub parent: Option<NodeId>,
    pub screen: Option<Screen>,
    pub guard: Option<Guard>,
    pub prefetch: Option<Prefetch>,
    pub validate_search: Option<SearchValidator>,
    pub effect: Option<EffectHook>,
}

impl RouteNode {
    pub fn new(id: &'static str, segment: Segment) -> Self {
        Self {
            id,
            segment,
            parent: None,
            screen: None,
            guard: None,
            prefetch: None,
            validate_search: None,
            effect: None,
        }
    }

    pub fn screen(mut self, screen: Screen) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn validate_search(mut self, validator: SearchValidator) -> Self {
        self.validate_search = Some(validator);
        self
    }

    pub fn effect(mut self, effect: EffectHook) -> Self {
        self.effect = Some(effect);
        self
    }
}

pub struct RouteTree {
    nodes: Vec<RouteNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub chain: Vec<NodeId>,
    pub params: RouteParams,
}

impl RouteTree {
    pub fn new(mut root: RouteNode) -> Self {
        root.parent = None;
        root.segment = Segment::Root;
        Self { nodes: vec![root] }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn add(&mut self, parent: NodeId, mut node: RouteNode) -> NodeId {
        node.parent = Some(parent);
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn node(&self, id: NodeId) -> &RouteNode {
        &self.nodes[id.0]
    }

    pub fn find(&self, id: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.id == id).map(NodeId)
    }

    fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(_, node)| node.parent == Some(parent))
            .map(|(index, _)| NodeId(index))
    }

    /// Finds the chain of nodes, root first, whose leaf renders `segments`.
    /// Children are tried in insertion order.
    pub fn match_segments(&self, segments: &[&str]) -> Option<RouteMatch> {
        let mut chain = Vec::new();
        let mut params = RouteParams::new();
        self.match_from(self.root(), segments, &mut chain, &mut params)
            .then_some(RouteMatch { chain, params })
    }

    fn match_from(
        &self,
        id: NodeId,
        segments: &[&str],
        chain: &mut Vec<NodeId>,
        params: &mut RouteParams,
    ) -> bool {
        let node = self.node(id);
        let rest = match node.segment {
            Segment::Root | Segment::Group => segments,
            Segment::Index if segments.is_empty() => segments,
            Segment::Index => return false,
            Segment::Static(expected) => match segments.split_first() {
                Some((head, rest)) if *head == expected => rest,
                _ => return false,
            },
            Segment::Param(name) => match segments.split_first() {
                Some((head, rest)) => {
                    params.insert(name.to_string(), (*head).to_string());
                    rest
                }
                None => return false,
            },
        };

        chain.push(id);
        if rest.is_empty() && node.screen.is_some() {
            return true;
        }
        if self
            .children(id)
            .any(|child| self.match_from(child, rest, chain, params))
        {
            return true;
        }
        chain.pop();
        if let Segment::Param(name) = node.segment {
            params.remove(name);
        }
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPlan {
    pub screen: Screen,
    pub route_ids: Vec<&'static str>,
    pub params: RouteParams,
    pub search: Option<ValidatedSearch>,
    /// Resources to ensure cached before rendering, root first.
    pub prefetch: Vec<ResourceKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Redirect { to: String },
    Render(RenderPlan),
    NotFound,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub effects: Vec<Effect>,
    pub outcome: Outcome,
}

/// Decides what a navigation to `location` leads to for `session`.
///
/// Per node, root first: the effect hook runs, then the search validator, then
/// the guard. The first redirect stops the walk. Prefetch directives are only
/// evaluated once every guard on the chain has passed, and may still redirect.
pub fn resolve(tree: &RouteTree, location: &Location, session: &SessionState) -> Resolution {
    let segments = location.segments();
    let mut effects = Vec::new();

    let Some(matched) = tree.match_segments(&segments) else {
        let params = RouteParams::new();
        let ctx = GuardContext {
            session,
            location,
            params: &params,
        };
        effects.extend(tree.node(tree.root()).effect.and_then(|hook| hook(&ctx)));
        return Resolution {
            effects,
            outcome: Outcome::NotFound,
        };
    };

    let ctx = GuardContext {
        session,
        location,
        params: &matched.params,
    };
    let mut search = None;

    for id in &matched.chain {
        let node = tree.node(*id);
        effects.extend(node.effect.and_then(|hook| hook(&ctx)));

        if let Some(validate) = node.validate_search {
            match validate(&location.search) {
                Ok(validated) => search = Some(validated),
                Err(error) => {
                    return Resolution {
                        effects,
                        outcome: Outcome::Error(format!("invalid search parameters: {error}")),
                    }
                }
            }
        }

        if let Some(guard) = node.guard {
            if let Err(redirect) = guard(&ctx) {
                return Resolution {
                    effects,
                    outcome: Outcome::Redirect { to: redirect.to },
                };
            }
        }
    }

    let mut prefetch = Vec::new();
    for id in &matched.chain {
        let Some(directive) = tree.node(*id).prefetch else {
            continue;
        };
        match directive(&ctx) {
            Ok(Some(key)) => prefetch.push(key),
            Ok(None) => {}
            Err(redirect) => {
                return Resolution {
                    effects,
                    outcome: Outcome::Redirect { to: redirect.to },
                }
            }
        }
    }

    let leaf = matched
        .chain
        .last()
        .map(|id| tree.node(*id))
        .and_then(|node| node.screen);
    let outcome = match leaf {
        Some(screen) => Outcome::Render(RenderPlan {
            screen,
            route_ids: matched.chain.iter().map(|id| tree.node(*id).id).collect(),
            params: matched.params.clone(),
            search,
            prefetch,
        }),
        None => Outcome::NotFound,
    };

    Resolution { effects, outcome }
}

#[cfg(test)]
#[path = "../tests/router_tests.rs"]
mod tests;
