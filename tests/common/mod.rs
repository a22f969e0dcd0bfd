//! A small users application: a listing loaded through a thunk-style
//! preload, and a detail view loaded through a saga watcher.

#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use ssr_preload::{
    resume::{Identified, Resume},
    store::{Reducer, Store},
    FetchError, RenderCx, RenderError,
};

#[cfg(feature = "ssr")]
mod ssr {
    pub use ssr_preload::{saga::Saga, App, TaskError};
}
#[cfg(feature = "ssr")]
use ssr::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl Identified for User {
    fn id(&self) -> i64 {
        self.id
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersState {
    pub users: Option<Vec<User>>,
    pub user: Option<User>,
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub users: UsersState,
}

#[derive(Clone, Debug)]
pub enum Action {
    GetUsersSuccess(Vec<User>),
    GetUsersFailure(String),
    GetUser(String),
    GetUserSuccess(User),
    GetUserFailure(String),
}

#[derive(Clone)]
pub struct AppReducer;

impl Reducer for AppReducer {
    type State = AppState;
    type Action = Action;

    fn reduce(&self, state: &mut AppState, action: &Action) {
        let users = &mut state.users;
        match action {
            Action::GetUsersSuccess(list) => users.users = Some(list.clone()),
            Action::GetUserSuccess(user) => users.user = Some(user.clone()),
            Action::GetUsersFailure(err) | Action::GetUserFailure(err) => {
                users.error = Some(err.clone())
            }
            Action::GetUser(_) => {}
        }
    }
}

/// A fake backend with configurable latency and failures.
pub struct FakeApi {
    pub users: Vec<User>,
    pub delay: Duration,
    pub fail: bool,
    pub calls: AtomicUsize,
    pub log: Mutex<Vec<String>>,
}

impl FakeApi {
    pub fn new(delay: Duration) -> Arc<Self> {
        Self::build(delay, false)
    }

    pub fn failing(delay: Duration) -> Arc<Self> {
        Self::build(delay, true)
    }

    fn build(delay: Duration, fail: bool) -> Arc<Self> {
        Arc::new(Self {
            users: sample_users(),
            delay,
            fail,
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(call);
    }

    pub async fn list(&self) -> Result<Vec<User>, FetchError> {
        self.record("list".into());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(FetchError::request("503 from /users"));
        }
        Ok(self.users.clone())
    }

    pub async fn get(&self, id: &str) -> Result<User, FetchError> {
        self.record(format!("get {id}"));
        tokio::time::sleep(self.delay).await;
        let wanted: i64 = id
            .parse()
            .map_err(|_| FetchError::request(format!("bad id {id}")))?;
        self.users
            .iter()
            .find(|user| user.id == wanted)
            .cloned()
            .ok_or_else(|| FetchError::request(format!("404 from /users/{id}")))
    }
}

pub fn sample_users() -> Vec<User> {
    ["Leanne", "Ervin", "Clementine"]
        .iter()
        .zip(1..)
        .map(|(name, id)| User {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
        })
        .collect()
}

/// Thunk: fetch the listing and store it.
pub async fn get_users(store: Store<AppReducer>, api: Arc<FakeApi>) -> Result<(), FetchError> {
    match api.list().await {
        Ok(list) => {
            store.dispatch(Action::GetUsersSuccess(list));
            Ok(())
        }
        Err(err) => {
            store.dispatch(Action::GetUsersFailure(err.to_string()));
            Err(err)
        }
    }
}

/// Saga watcher: fetch a user for every `GetUser`.
#[cfg(feature = "ssr")]
pub fn users_saga(saga: &Saga<AppReducer>, api: Arc<FakeApi>) {
    saga.take_every(
        "get_user",
        |action| matches!(action, Action::GetUser(_)),
        move |store, action| {
            let api = api.clone();
            async move {
                let Action::GetUser(id) = action else {
                    return Ok(());
                };
                match api.get(&id).await {
                    Ok(user) => store.dispatch(Action::GetUserSuccess(user)),
                    Err(err) => {
                        store.dispatch(Action::GetUserFailure(err.to_string()));
                        return Err(TaskError::failed("get_user", err));
                    }
                }
                Ok(())
            }
        },
    );
}

pub fn render_users(users: &[User]) -> String {
    let items: String = users
        .iter()
        .map(|user| format!(r#"<li><a href="/users/{}">{}</a></li>"#, user.id, user.name))
        .collect();
    format!(r#"<ul class="users">{items}</ul>"#)
}

pub fn render_user(user: &User) -> String {
    format!(
        r#"<div class="user"><h1>{} ({})</h1><p>{}</p></div>"#,
        user.name, user.id, user.email
    )
}

/// The listing container: preloads through the declarative trigger.
pub fn users_container(cx: &RenderCx<'_, AppReducer>, api: &Arc<FakeApi>) -> String {
    let users = cx.store().select(|s| s.users.users.clone());
    let store = cx.store().clone();
    let api = api.clone();
    let marker = cx.preloader(move || get_users(store, api));
    let list = users.as_deref().map(render_users).unwrap_or_default();
    format!("{list}{marker}")
}

/// The detail container: preloads through the imperative trigger by
/// dispatching an action the saga picks up.
pub fn user_container(cx: &RenderCx<'_, AppReducer>, id: &str) -> String {
    let store = cx.store().clone();
    let requested = id.to_string();
    cx.use_preloader(move || {
        store.dispatch(Action::GetUser(requested));
        futures::future::ready(Ok(()))
    });
    cx.use_chunk("user");
    cx.store()
        .select(|s| s.users.user.clone())
        .map(|user| render_user(&user))
        .unwrap_or_default()
}

pub struct UsersApp {
    pub api: Arc<FakeApi>,
    /// Paths rendered, with whether the registry was still collecting.
    pub passes: Mutex<Vec<(String, bool)>>,
}

impl UsersApp {
    pub fn new(api: Arc<FakeApi>) -> Self {
        Self {
            api,
            passes: Mutex::new(Vec::new()),
        }
    }

    pub fn render(&self, path: &str, cx: &RenderCx<'_, AppReducer>) -> Result<String, RenderError> {
        self.passes
            .lock()
            .unwrap()
            .push((path.to_string(), cx.is_collecting()));
        let body = match path.trim_end_matches('/') {
            "/users" => {
                cx.use_chunk("users");
                users_container(cx, &self.api)
            }
            other => match other.strip_prefix("/users/") {
                Some(id) => user_container(cx, id),
                None => return Err(RenderError::view(format!("no route for {path}"))),
            },
        };
        Ok(format!("<main>{body}</main>"))
    }
}

/// Lets a test keep a handle on the app it gave to a renderer.
pub struct Shared(pub Arc<UsersApp>);

#[cfg(feature = "ssr")]
impl App<AppReducer> for Shared {
    fn render(&self, path: &str, cx: &RenderCx<'_, AppReducer>) -> Result<String, RenderError> {
        self.0.render(path, cx)
    }
}

/// The client-side detail view: fetches only what the store lacks.
pub struct UserView {
    resume: Resume,
}

impl UserView {
    pub fn new() -> Self {
        Self {
            resume: Resume::new(),
        }
    }

    /// Mounts or updates the view; returns whether a fetch was issued.
    pub fn update(&mut self, store: &Store<AppReducer>, id: &str) -> bool {
        let present = store.select(|s| s.users.user.clone());
        self.resume.on_update(id, present.as_ref(), |id| {
            store.dispatch(Action::GetUser(id.to_string()))
        })
    }
}
