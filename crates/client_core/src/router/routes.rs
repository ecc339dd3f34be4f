//! The application's route table.

use shared::{
    domain::TaskId,
    protocol::{ResetPasswordParams, VerifyEmailParams},
};

use super::{
    Effect, GuardContext, Redirect, RouteNode, RouteTree, Screen, Segment, ValidatedSearch,
};
use crate::cache::ResourceKey;

pub const HOME_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const REGISTER_PATH: &str = "/register";
pub const FORGOT_PASSWORD_PATH: &str = "/forgot-password";
pub const RESET_PASSWORD_PATH: &str = "/reset-password";
pub const VERIFY_EMAIL_PATH: &str = "/verify-email";
pub const TASKS_PATH: &str = "/tasks";
pub const SETTINGS_PATH: &str = "/tasks/settings";
pub const NEW_TASK_PATH: &str = "/tasks/new";

pub const TASK_ID_PARAM: &str = "taskId";

pub fn task_path(task_id: &TaskId) -> String {
    format!("{TASKS_PATH}/{task_id}")
}

pub fn app_routes() -> RouteTree {
    let mut tree = RouteTree::new(
        RouteNode::new("root", Segment::Root)
            .effect(apply_session_theme)
            .prefetch(prefetch_current_user),
    );
    let root = tree.root();

    tree.add(
        root,
        RouteNode::new("home", Segment::Index)
            .screen(Screen::Home)
            .guard(redirect_authenticated_home),
    );

    let auth = tree.add(
        root,
        RouteNode::new("auth", Segment::Group).guard(redirect_authenticated_from_auth),
    );
    tree.add(
        auth,
        RouteNode::new("login", Segment::Static("login"))
            .screen(Screen::Login)
            .guard(require_verified_email),
    );
    tree.add(
        auth,
        RouteNode::new("register", Segment::Static("register"))
            .screen(Screen::Register)
            .guard(require_verified_email),
    );
    tree.add(
        auth,
        RouteNode::new("verify-email", Segment::Static("verify-email"))
            .screen(Screen::VerifyEmail)
            .validate_search(|search| {
                VerifyEmailParams::from_search(search).map(ValidatedSearch::VerifyEmail)
            }),
    );
    tree.add(
        auth,
        RouteNode::new("forgot-password", Segment::Static("forgot-password"))
            .screen(Screen::ForgotPassword)
            .guard(require_verified_email),
    );
    tree.add(
        auth,
        RouteNode::new("reset-password", Segment::Static("reset-password"))
            .screen(Screen::ResetPassword)
            .validate_search(|search| {
                ResetPasswordParams::from_search(search).map(ValidatedSearch::ResetPassword)
            }),
    );

    let tasks = tree.add(
        root,
        RouteNode::new("tasks", Segment::Static("tasks"))
            .screen(Screen::TaskList)
            .guard(require_authenticated)
            .prefetch(|_| Ok(Some(ResourceKey::Tasks))),
    );
    tree.add(
        tasks,
        RouteNode::new("settings", Segment::Static("settings")).screen(Screen::Settings),
    );
    tree.add(
        tasks,
        RouteNode::new("new-task", Segment::Static("new")).screen(Screen::NewTask),
    );
    tree.add(
        tasks,
        RouteNode::new("edit-task", Segment::Param(TASK_ID_PARAM))
            .screen(Screen::EditTask)
            .prefetch(prefetch_task),
    );

    tree
}

fn apply_session_theme(ctx: &GuardContext<'_>) -> Option<Effect> {
    Some(Effect::ApplyTheme(ctx.session.theme.unwrap_or_default()))
}

fn prefetch_current_user(ctx: &GuardContext<'_>) -> Result<Option<ResourceKey>, Redirect> {
    Ok(ctx.session.logged_in.then_some(ResourceKey::CurrentUser))
}

fn redirect_authenticated_home(ctx: &GuardContext<'_>) -> Result<(), Redirect> {
    if ctx.session.authenticated {
        return Err(Redirect::to(TASKS_PATH));
    }
    Ok(())
}

/// Signed-in users have no business on the auth screens, except for
/// resetting a password.
fn redirect_authenticated_from_auth(ctx: &GuardContext<'_>) -> Result<(), Redirect> {
    if ctx.session.authenticated && ctx.location.path != RESET_PASSWORD_PATH {
        return Err(Redirect::to(TASKS_PATH));
    }
    Ok(())
}

fn require_verified_email(ctx: &GuardContext<'_>) -> Result<(), Redirect> {
    if ctx.session.logged_in && !ctx.session.email_verified {
        return Err(Redirect::to(VERIFY_EMAIL_PATH));
    }
    Ok(())
}

fn require_authenticated(ctx: &GuardContext<'_>) -> Result<(), Redirect> {
    if !ctx.session.authenticated {
        return Err(Redirect::to(LOGIN_PATH));
    }
    Ok(())
}

fn prefetch_task(ctx: &GuardContext<'_>) -> Result<Option<ResourceKey>, Redirect> {
    let raw = ctx
        .params
        .get(TASK_ID_PARAM)
        .map(String::as_str)
        .unwrap_or_default();
    match TaskId::parse(raw) {
        Ok(task_id) => Ok(Some(ResourceKey::Task(task_id))),
        Err(error) => {
            tracing::debug!(task_id = raw, %error, "invalid task id in path");
            Err(Redirect::to(TASKS_PATH))
        }
    }
}
