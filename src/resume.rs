//! Deciding on the client whether data from the server can be reused.
//!
//! After hydration the store may already hold what a view asks for.  A
//! view wires its fetch through a [`Resume`], which runs the check on
//! first mount and again whenever the view's dependencies change, and
//! only fetches when the data present does not satisfy the request.
//!
//! ```
//! use ssr_preload::resume::{Identified, Resume};
//!
//! struct User { id: i64 }
//! impl Identified for User {
//!     fn id(&self) -> i64 { self.id }
//! }
//!
//! let present = Some(User { id: 5 });
//! let mut fetched = Vec::new();
//! let mut resume = Resume::new();
//!
//! // Mount with the id the server already fetched: nothing to do.
//! resume.on_update("5", present.as_ref(), |id| fetched.push(id.to_string()));
//! // Navigating to another id fetches it.
//! resume.on_update("7", present.as_ref(), |id| fetched.push(id.to_string()));
//! assert_eq!(fetched, ["7"]);
//! ```

/// A datum carrying a numeric identity.
pub trait Identified {
    fn id(&self) -> i64;
}

/// Parses the leading base-10 integer of `raw`.
///
/// Leading whitespace and a sign are accepted and anything after the
/// digits is ignored, so `" 42px"` yields `42`.  Ids reach views as
/// route text, and this is how that text is compared with stored ids.
pub fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let len = digits.bytes().take_while(u8::is_ascii_digit).count();
    if len == 0 {
        return None;
    }
    let value: i64 = digits[..len].parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Whether `present` already is the datum `requested` names.
pub fn is_resumable<T: Identified>(present: Option<&T>, requested: &str) -> bool {
    match (present, parse_int(requested)) {
        (Some(datum), Some(id)) => datum.id() == id,
        _ => false,
    }
}

/// Runs a callback on first use and whenever its dependencies change.
#[derive(Debug, Default)]
pub struct Effect<D> {
    deps: Option<D>,
}

impl<D: PartialEq> Effect<D> {
    pub fn new() -> Self {
        Self { deps: None }
    }

    /// Runs `f` when `deps` differ from the previous call.  Returns
    /// whether it ran.
    pub fn run_if_changed(&mut self, deps: D, f: impl FnOnce(&D)) -> bool {
        if self.deps.as_ref() == Some(&deps) {
            return false;
        }
        f(&deps);
        self.deps = Some(deps);
        true
    }
}

/// Fetch guard for a view keyed by a requested id.
#[derive(Debug, Default)]
pub struct Resume {
    effect: Effect<(String, Option<i64>)>,
}

impl Resume {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on mount and on every update of the view.
    ///
    /// The check is re-evaluated when the requested id or the identity
    /// of the present datum changes.  `fetch` is called with the
    /// requested id when the present datum does not match it.  Returns
    /// whether a fetch was issued.
    pub fn on_update<T: Identified>(
        &mut self,
        requested: &str,
        present: Option<&T>,
        fetch: impl FnOnce(&str),
    ) -> bool {
        let mut issued = false;
        let deps = (requested.to_string(), present.map(Identified::id));
        self.effect.run_if_changed(deps, |_| {
            if !is_resumable(present, requested) {
                fetch(requested);
                issued = true;
            }
        });
        issued
    }
}

/// Fetch guard for a view over a collection: fetch only when nothing
/// is present.  Returns whether a fetch was issued.
pub fn resume_collection<T>(present: Option<&T>, fetch: impl FnOnce()) -> bool {
    if present.is_some() {
        return false;
    }
    fetch();
    true
}
