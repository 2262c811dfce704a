//! Registry of (name, handler) bindings, keyed by a 64-bit DJB2 name-hash.
//!
//! A plain linear scan over a `Vec`, not a hash map — the data model calls
//! for O(n) lookup by name or by id, the same shape as the source's
//! `function_queue` (a queue searched linearly by `function_search`/
//! `function_search_id`). Registration only happens during single-threaded
//! setup; `serve_all` never takes anything but a read lock.

use std::sync::{Arc, RwLock};

use crate::payload::Payload;

/// A server-side procedure handler.
///
/// Takes the request payload, returns `None` to signal a null response
/// (the server still replies — just with an empty payload frame).
pub type Handler = dyn Fn(&Payload) -> Option<Payload> + Send + Sync;

/// One registered procedure.
pub struct RegisteredFunction {
    pub id: u64,
    pub name: String,
    pub handler: Arc<Handler>,
}

impl Clone for RegisteredFunction {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name.clone(),
            handler: self.handler.clone(),
        }
    }
}

impl std::fmt::Debug for RegisteredFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredFunction")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// DJB2 hash, the sole identity used on the wire after registration.
///
/// `h0 = 5381; h[i] = h[i-1] * 33 + byte`, accumulated modulo 2^64.
pub fn djb2(name: &[u8]) -> u64 {
    let mut hash: u64 = 5381;
    for &b in name {
        hash = hash.wrapping_mul(33).wrapping_add(b as u64);
    }
    hash
}

/// Names must be non-empty and printable ASCII (32-126).
fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| (32..=126).contains(&b))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("function name is empty or contains non-printable-ASCII bytes")]
    InvalidName,
    #[error("a function with id {0:#018x} is already registered (name-hash collision or duplicate name)")]
    Duplicate(u64),
    #[error("register called after serve_all had already started accepting connections")]
    AfterServeStarted,
}

/// Set of registered functions. Read-only from workers' perspective once
/// `serve_all` begins — see SPEC_FULL.md §5.
#[derive(Default)]
pub struct Registry {
    functions: RwLock<Vec<RegisteredFunction>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(Vec::new()),
        }
    }

    /// Register a named handler. Rejects invalid names and id collisions
    /// (whether from a genuine DJB2 collision or a re-registered name).
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: impl Fn(&Payload) -> Option<Payload> + Send + Sync + 'static,
    ) -> Result<u64, RegisterError> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(RegisterError::InvalidName);
        }
        let id = djb2(name.as_bytes());

        let mut functions = self.functions.write().expect("registry lock poisoned");
        if functions.iter().any(|f| f.id == id) {
            return Err(RegisterError::Duplicate(id));
        }
        functions.push(RegisteredFunction {
            id,
            name,
            handler: Arc::new(handler),
        });
        Ok(id)
    }

    /// Hash `name` and delegate to [`Registry::find_by_id`].
    pub fn find_by_name(&self, name: &str) -> Option<RegisteredFunction> {
        self.find_by_id(djb2(name.as_bytes()))
    }

    /// Linear scan for the function with the given id.
    pub fn find_by_id(&self, id: u64) -> Option<RegisteredFunction> {
        self.functions
            .read()
            .expect("registry lock poisoned")
            .iter()
            .find(|f| f.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
