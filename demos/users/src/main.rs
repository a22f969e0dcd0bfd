//! A users directory rendered on the server with its data in place.
//!
//! `/users` loads its listing through a declarative preload; `/users/:id`
//! dispatches an action picked up by a saga watcher.  Both pages embed
//! the store state for the client to resume from.
//!
//! Run with `RUST_LOG=ssr_preload=debug cargo run` from this directory.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use ssr_preload::{
    assets::ChunkStats,
    http::router,
    saga::Saga,
    store::{Reducer, Store},
    DocumentShell, FetchError, RenderConfig, RenderCx, RenderError, Renderer, TaskError,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct UsersState {
    users: Option<Vec<User>>,
    user: Option<User>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct State {
    users: UsersState,
}

#[derive(Clone, Debug)]
enum Action {
    GetUsersSuccess(Vec<User>),
    GetUser(i64),
    GetUserSuccess(User),
}

#[derive(Clone)]
struct Users;

impl Reducer for Users {
    type State = State;
    type Action = Action;

    fn reduce(&self, state: &mut State, action: &Action) {
        match action {
            Action::GetUsersSuccess(users) => state.users.users = Some(users.clone()),
            Action::GetUserSuccess(user) => state.users.user = Some(user.clone()),
            Action::GetUser(_) => {}
        }
    }
}

const NAMES: [&str; 4] = ["Leanne", "Ervin", "Clementine", "Patricia"];

// Stand-ins for calls to a backend API.
async fn fetch_users() -> Result<Vec<User>, FetchError> {
    tokio::time::sleep(Duration::from_millis(40)).await;
    Ok(NAMES
        .iter()
        .zip(1..)
        .map(|(name, id)| User {
            id,
            name: name.to_string(),
        })
        .collect())
}

async fn fetch_user(id: i64) -> Result<User, FetchError> {
    tokio::time::sleep(Duration::from_millis(25)).await;
    usize::try_from(id - 1)
        .ok()
        .and_then(|index| NAMES.get(index))
        .map(|name| User {
            id,
            name: name.to_string(),
        })
        .ok_or_else(|| FetchError::request(format!("no user {id}")))
}

fn watch_users(saga: &Saga<Users>) {
    saga.take_every(
        "get_user",
        |action| matches!(action, Action::GetUser(_)),
        |store: Store<Users>, action| async move {
            if let Action::GetUser(id) = action {
                let user = fetch_user(id)
                    .await
                    .map_err(|err| TaskError::failed("get_user", err))?;
                store.dispatch(Action::GetUserSuccess(user));
            }
            Ok::<_, TaskError>(())
        },
    );
}

fn app(path: &str, cx: &RenderCx<'_, Users>) -> Result<String, RenderError> {
    if path == "/users" {
        let store = cx.store().clone();
        let marker = cx.preloader(move || async move {
            store.dispatch(Action::GetUsersSuccess(fetch_users().await?));
            Ok::<_, FetchError>(())
        });
        let items: String = cx
            .store()
            .select(|s| s.users.users.clone())
            .unwrap_or_default()
            .iter()
            .map(|user| format!(r#"<li><a href="/users/{0}">{1}</a></li>"#, user.id, user.name))
            .collect();
        return Ok(format!("<ul>{items}</ul>{marker}"));
    }
    let id = path
        .strip_prefix("/users/")
        .and_then(|id| id.parse::<i64>().ok())
        .ok_or_else(|| RenderError::view(format!("no route for {path}")))?;
    let store = cx.store().clone();
    cx.use_preloader(move || {
        store.dispatch(Action::GetUser(id));
        futures::future::ready(Ok(()))
    });
    cx.use_chunk("user");
    let name = cx
        .store()
        .select(|s| s.users.user.as_ref().map(|user| user.name.clone()))
        .unwrap_or_default();
    Ok(format!("<h1>{name}</h1>"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RenderConfig::load("render.toml")?;
    let mut renderer = Renderer::new(Users, app)
        .with_saga(watch_users)
        .with_config(config);
    if let Ok(stats) = ChunkStats::load("loadable-stats.json") {
        renderer = renderer.with_assets(stats);
    }

    let app = router(Arc::new(renderer), DocumentShell::default().with_title("Users"));
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
