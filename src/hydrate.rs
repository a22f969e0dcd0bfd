//! Moving the final server state into the client's store.
//!
//! The server embeds the state as an inline script assigning a single
//! global, and the client seeds its store from that global at startup.
//!
//! ```
//! use ssr_preload::hydrate::{hydrate, read_snapshot, serialize_state, state_script};
//!
//! let state = vec!["</script><script>alert(1)".to_string()];
//! let script = state_script("__PRELOADED_STATE__", &serialize_state(&state).unwrap());
//! assert!(!script.contains("</script><script>alert"));
//!
//! let snapshot = read_snapshot(&script, "__PRELOADED_STATE__");
//! let restored: Vec<String> = hydrate(snapshot).unwrap();
//! assert_eq!(restored, state);
//! ```

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::HydrationError,
    store::{Middleware, Reducer, Store},
};

/// Replaces every `<` so the text cannot close the enclosing script.
pub fn escape_json(json: &str) -> String {
    json.replace('<', "\\u003c")
}

/// Encodes `state` as JSON suitable for embedding in a script element.
pub fn serialize_state<S: Serialize + ?Sized>(state: &S) -> Result<String, HydrationError> {
    let json = serde_json::to_string(state).map_err(HydrationError::Serialize)?;
    Ok(escape_json(&json))
}

/// Wraps escaped JSON in a script assigning the global `var`.
///
/// This script must come before the application bundle in document
/// order.
pub fn state_script(var: &str, escaped_json: &str) -> String {
    format!("<script>window.{var} = {escaped_json};</script>")
}

/// Extracts the snapshot assigned to `var` from a document or script.
///
/// Returns `None` when the page carries no snapshot, as on a plain
/// client-rendered load.
pub fn read_snapshot<'a>(document: &'a str, var: &str) -> Option<&'a str> {
    let marker = format!("window.{var} = ");
    let start = document.find(&marker)? + marker.len();
    let rest = &document[start..];
    // An escaped snapshot holds no `<`, so the first close tag is ours.
    let end = rest.find("</script>")?;
    Some(rest[..end].trim_end().trim_end_matches(';'))
}

/// Builds the initial client state from an optional snapshot.
pub fn hydrate<S>(snapshot: Option<&str>) -> Result<S, HydrationError>
where
    S: DeserializeOwned + Default,
{
    match snapshot {
        Some(json) => serde_json::from_str(json).map_err(HydrationError::Deserialize),
        None => Ok(S::default()),
    }
}

/// Creates the client's store, seeded from `snapshot` when present.
pub fn hydrate_store<R: Reducer>(
    reducer: R,
    snapshot: Option<&str>,
    middleware: Vec<Arc<dyn Middleware<R>>>,
) -> Result<Store<R>, HydrationError> {
    let state = hydrate::<R::State>(snapshot)?;
    Ok(Store::with_state(reducer, state, middleware))
}
