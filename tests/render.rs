#![cfg(feature = "ssr")]

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use ssr_preload::{
    hydrate::{hydrate, read_snapshot},
    store::Store,
    App, DocumentShell, FetchError, RenderCx, RenderError, Renderer, TaskError,
    DEFAULT_SNAPSHOT_VAR,
};
use tokio::time::{sleep, Instant};
use tokio_test::{assert_err, assert_ok};

use common::*;

fn users_renderer(api: Arc<FakeApi>) -> (Arc<UsersApp>, Renderer<AppReducer>) {
    let app = Arc::new(UsersApp::new(api.clone()));
    let renderer = Renderer::new(AppReducer, Shared(app.clone()))
        .with_saga(move |saga| users_saga(saga, api.clone()));
    (app, renderer)
}

#[tokio::test(start_paused = true)]
async fn listing_is_rendered_with_its_data() {
    let api = FakeApi::new(Duration::from_millis(20));
    let (app, renderer) = users_renderer(api.clone());

    let started = Instant::now();
    let page = assert_ok!(renderer.render("/users").await);
    assert!(started.elapsed() >= Duration::from_millis(20));

    for user in sample_users() {
        assert!(page.markup.contains(&user.name), "{} missing", user.name);
    }
    assert_eq!(api.calls(), 1);
    assert_eq!(
        *app.passes.lock().unwrap(),
        [("/users".to_string(), true), ("/users".to_string(), false)]
    );

    let snapshot = read_snapshot(&page.tags.scripts, DEFAULT_SNAPSHOT_VAR).unwrap();
    let state: AppState = hydrate(Some(snapshot)).unwrap();
    assert_eq!(state.users.users, Some(sample_users()));
    assert_eq!(page.state["users"]["users"][2]["name"], "Clementine");
}

#[tokio::test(start_paused = true)]
async fn final_pass_issues_no_fetches() {
    let api = FakeApi::new(Duration::from_millis(5));
    let (_app, renderer) = users_renderer(api.clone());

    assert_ok!(renderer.render("/users").await);
    assert_ok!(renderer.render("/users/2").await);

    // One fetch per request, all from the collecting passes.
    assert_eq!(api.calls(), 2);
    assert_eq!(*api.log.lock().unwrap(), ["list", "get 2"]);
}

#[tokio::test(start_paused = true)]
async fn saga_backed_page_is_rendered_with_its_data() {
    let api = FakeApi::new(Duration::from_millis(30));
    let (_app, renderer) = users_renderer(api.clone());

    let page = assert_ok!(renderer.render("/users/3").await);
    assert_eq!(
        page.markup,
        r#"<main><div class="user"><h1>Clementine (3)</h1><p>clementine@example.com</p></div></main>"#
    );
    assert_eq!(page.state["users"]["user"]["id"], 3);
    assert!(page.tags.scripts.starts_with("<script>window.__PRELOADED_STATE__ = "));
}

#[tokio::test(start_paused = true)]
async fn failed_saga_fetch_fails_the_request() {
    let api = FakeApi::new(Duration::from_millis(5));
    let (app, renderer) = users_renderer(api.clone());

    let err = assert_err!(renderer.render("/users/42").await);
    assert_eq!(err.as_label(), "render_task");
    // The final pass never ran.
    assert_eq!(app.passes.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_preload_fails_the_request() {
    let api = FakeApi::failing(Duration::from_millis(5));
    let (app, renderer) = users_renderer(api.clone());

    let err = assert_err!(renderer.render("/users").await);
    assert!(matches!(err, RenderError::Fetch(_)));
    assert_eq!(app.passes.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_route_is_a_view_error() {
    let api = FakeApi::new(Duration::ZERO);
    let (_app, renderer) = users_renderer(api.clone());

    let err = assert_err!(renderer.render("/nowhere").await);
    assert_eq!(err.as_label(), "render_view");
    assert_eq!(api.calls(), 0);
}

/// Three independent fetches of different latency; records when the
/// final pass started.
struct Staggered {
    delays: Vec<u64>,
    fail: Option<usize>,
    started: Arc<Mutex<Option<Instant>>>,
    finals: Arc<AtomicUsize>,
}

impl App<AppReducer> for Staggered {
    fn render(&self, _path: &str, cx: &RenderCx<'_, AppReducer>) -> Result<String, RenderError> {
        if !cx.is_collecting() {
            self.started.lock().unwrap().get_or_insert_with(Instant::now);
            self.finals.fetch_add(1, Ordering::SeqCst);
            return Ok(String::new());
        }
        for (index, delay) in self.delays.iter().copied().enumerate() {
            let fail = self.fail == Some(index);
            cx.use_preloader(move || async move {
                sleep(Duration::from_millis(delay)).await;
                if fail {
                    return Err(FetchError::request("rejected"));
                }
                Ok(())
            });
        }
        Ok(String::new())
    }
}

fn staggered(fail: Option<usize>) -> (Staggered, Arc<Mutex<Option<Instant>>>, Arc<AtomicUsize>) {
    let started = Arc::new(Mutex::new(None));
    let finals = Arc::new(AtomicUsize::new(0));
    let app = Staggered {
        delays: vec![10, 50, 5],
        fail,
        started: started.clone(),
        finals: finals.clone(),
    };
    (app, started, finals)
}

#[tokio::test(start_paused = true)]
async fn final_pass_waits_for_the_slowest_fetch() {
    let (app, started, finals) = staggered(None);
    let renderer = Renderer::new(AppReducer, app);

    let begin = Instant::now();
    assert_ok!(renderer.render("/").await);

    let started = started.lock().unwrap().unwrap();
    assert!(started - begin >= Duration::from_millis(50));
    assert_eq!(finals.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn one_rejection_skips_the_final_pass() {
    let (app, started, finals) = staggered(Some(2));
    let renderer = Renderer::new(AppReducer, app);

    let begin = Instant::now();
    let err = assert_err!(renderer.render("/").await);
    assert_eq!(err.as_label(), "render_fetch");
    // Failing fast: the 5ms rejection does not wait on the 50ms fetch.
    assert!(begin.elapsed() < Duration::from_millis(50));
    assert!(started.lock().unwrap().is_none());
    assert_eq!(finals.load(Ordering::SeqCst), 0);
}

#[test]
fn client_render_registers_nothing() {
    let api = FakeApi::new(Duration::ZERO);
    let app = UsersApp::new(api.clone());
    let store = Store::new(AppReducer);
    let cx = RenderCx::client(&store);

    for path in ["/users", "/users/1"] {
        let markup = assert_ok!(app.render(path, &cx));
        assert_eq!(markup, "<main></main>");
    }
    assert!(!cx.is_collecting());
    assert_eq!(api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn document_carries_the_snapshot_the_client_reads() {
    let api = FakeApi::new(Duration::from_millis(5));
    let (_app, renderer) = users_renderer(api);

    let page = assert_ok!(renderer.render("/users/1").await);
    let expected = page.state.clone();
    let html = page.into_html(&DocumentShell::default().with_title("Users"));

    assert!(html.starts_with("<!DOCTYPE html>"));
    let root = html.find(r#"<div id="root">"#).unwrap();
    let snapshot_at = html.find("window.__PRELOADED_STATE__").unwrap();
    assert!(root < snapshot_at);

    let snapshot = read_snapshot(&html, DEFAULT_SNAPSHOT_VAR).unwrap();
    let state: AppState = hydrate(Some(snapshot)).unwrap();
    assert_eq!(serde_json::to_value(&state).unwrap(), expected);
    assert_eq!(state.users.user.map(|user| user.name), Some("Leanne".to_string()));
}

/// A user page that requests its user and then floods the store with
/// unrelated actions, all while collecting.
struct Noisy {
    id: &'static str,
    noise: usize,
}

impl App<AppReducer> for Noisy {
    fn render(&self, _path: &str, cx: &RenderCx<'_, AppReducer>) -> Result<String, RenderError> {
        if cx.is_collecting() {
            let store = cx.store().clone();
            let id = self.id.to_string();
            cx.use_preloader(move || {
                store.dispatch(Action::GetUser(id));
                futures::future::ready(Ok(()))
            });
            for index in 0..self.noise {
                cx.store().dispatch(Action::GetUsersFailure(format!("noise {index}")));
            }
        }
        Ok(cx
            .store()
            .select(|s| s.users.user.clone())
            .map(|user| render_user(&user))
            .unwrap_or_default())
    }
}

#[tokio::test(start_paused = true)]
async fn watched_action_survives_a_burst_of_dispatches() {
    let api = FakeApi::new(Duration::from_millis(5));
    let saga_api = api.clone();
    let renderer = Renderer::new(AppReducer, Noisy { id: "3", noise: 1_100 })
        .with_saga(move |saga| users_saga(saga, saga_api.clone()));

    let page = assert_ok!(renderer.render("/users/3").await);
    assert!(page.markup.contains("Clementine (3)"));
    assert_eq!(api.calls(), 1);
}

/// Dispatches the saga's action from inside the returned future, which
/// runs only after the watchers were told to stop.
struct LateDispatch;

impl App<AppReducer> for LateDispatch {
    fn render(&self, _path: &str, cx: &RenderCx<'_, AppReducer>) -> Result<String, RenderError> {
        let store = cx.store().clone();
        cx.use_preloader(move || async move {
            store.dispatch(Action::GetUser("2".into()));
            Ok(())
        });
        Ok(String::new())
    }
}

#[tokio::test(start_paused = true)]
async fn action_dispatched_too_late_fails_the_request() {
    let api = FakeApi::new(Duration::from_millis(5));
    let saga_api = api.clone();
    let renderer =
        Renderer::new(AppReducer, LateDispatch).with_saga(move |saga| users_saga(saga, saga_api.clone()));

    let err = assert_err!(renderer.render("/users/2").await);
    assert_eq!(err.as_label(), "render_task");
    assert!(matches!(
        err,
        RenderError::Task(TaskError::Missed { ref name, .. }) if name == "get_user"
    ));
    assert_eq!(api.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn seeded_request_keeps_data_it_was_given() {
    let api = FakeApi::new(Duration::from_millis(5));
    let (_app, renderer) = users_renderer(api.clone());
    let seed = AppState {
        users: UsersState {
            error: Some("stale".into()),
            ..UsersState::default()
        },
    };

    let page = assert_ok!(renderer.render_with_state("/users", Some(seed)).await);
    assert_eq!(page.state["users"]["error"], "stale");
    assert_eq!(page.state["users"]["users"][0]["name"], "Leanne");
}
