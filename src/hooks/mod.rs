//! Stateful data hooks.
//!
//! A [`DataHook`] wraps one fetch operation and exposes `{data, loading,
//! error}` state plus `refetch`. Authentication loss (`NoToken` or
//! `AuthExpired`) is reported to the injected [`Navigator`] as a redirect to
//! [`LOGIN_ROUTE`]; the view layer decides what navigating means.
//!
//! Hooks never retry on their own. Overlapping `refetch` calls are allowed
//! and the last one to resolve wins.

pub mod form;

pub use form::{FieldEvent, FormState};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::api::request::{RequestDescriptor, RequestOptions};
use crate::api::types::User;

/// Route views are sent to when the session is lost.
pub const LOGIN_ROUTE: &str = "/login";

/// Navigation side effect owned by the view layer.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that only records the requested routes.
#[derive(Debug, Default)]
pub struct NavigationLog {
    routes: Mutex<Vec<String>>,
}

impl NavigationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<String> {
        match self.routes.lock() {
            Ok(routes) => routes.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn last(&self) -> Option<String> {
        self.routes().pop()
    }
}

impl Navigator for NavigationLog {
    fn navigate(&self, route: &str) {
        log::info!("Navigating to {}", route);
        match self.routes.lock() {
            Ok(mut routes) => routes.push(route.to_string()),
            Err(poisoned) => poisoned.into_inner().push(route.to_string()),
        }
    }
}

/// View-facing state of a hook.
#[derive(Debug, Clone, PartialEq)]
pub struct HookState<T> {
    /// Last successful payload, or the hook's initial value.
    pub data: Option<T>,
    /// True while a fetch is in flight.
    pub loading: bool,
    /// Message of the last failed fetch; cleared when a new fetch starts.
    pub error: Option<String>,
}

/// The fetch operation a hook wraps.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

pub struct DataHook<T> {
    state: RwLock<HookState<T>>,
    fetcher: Fetcher<T>,
    navigator: Arc<dyn Navigator>,
    mounted: AtomicBool,
    fetch_on_mount: bool,
}

impl<T: Clone + Send + Sync + 'static> DataHook<T> {
    /// `loading` starts out equal to `fetch_on_mount`.
    pub fn new(
        fetcher: Fetcher<T>,
        navigator: Arc<dyn Navigator>,
        initial: Option<T>,
        fetch_on_mount: bool,
    ) -> Self {
        Self {
            state: RwLock::new(HookState {
                data: initial,
                loading: fetch_on_mount,
                error: None,
            }),
            fetcher,
            navigator,
            mounted: AtomicBool::new(true),
            fetch_on_mount,
        }
    }

    /// Run the initial fetch, if this hook fetches on mount.
    pub async fn mount(&self) -> Option<T> {
        if !self.fetch_on_mount {
            return None;
        }
        self.refetch().await.ok()
    }

    /// One fetch cycle.
    ///
    /// Sets `loading` and clears `error`, runs the fetcher, then records the
    /// payload or the error message and clears `loading`. An unmounted hook
    /// still runs the fetcher but never touches its state.
    pub async fn refetch(&self) -> Result<T, ApiError> {
        if !self.is_mounted() {
            log::debug!("Refetch on unmounted hook, state left unchanged");
            return (self.fetcher)().await;
        }
        {
            let mut state = self.state.write().await;
            state.loading = true;
            state.error = None;
        }

        let result = (self.fetcher)().await;

        if !self.is_mounted() {
            log::debug!("Fetch completed after unmount, discarding result");
            return result;
        }

        {
            let mut state = self.state.write().await;
            match result {
                Ok(ref data) => {
                    state.data = Some(data.clone());
                    state.error = None;
                }
                Err(ref e) => {
                    state.error = Some(e.to_string());
                }
            }
            state.loading = false;
        }

        if let Err(ref e) = result {
            if e.is_auth_loss() {
                self.navigator.navigate(LOGIN_ROUTE);
            }
        }
        result
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> HookState<T> {
        self.state.read().await.clone()
    }

    pub async fn data(&self) -> Option<T> {
        self.state.read().await.data.clone()
    }

    /// Replace the cached payload without fetching.
    pub async fn set_data(&self, data: Option<T>) {
        if !self.is_mounted() {
            return;
        }
        self.state.write().await.data = data;
    }

    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }
}

impl DataHook<User> {
    /// Whether the loaded user holds an admin role.
    pub async fn is_admin(&self) -> bool {
        self.state
            .read()
            .await
            .data
            .as_ref()
            .is_some_and(User::is_admin)
    }
}

/// Current user (`GET /team-roster/me`).
pub fn user_hook(client: Arc<ApiClient>, navigator: Arc<dyn Navigator>) -> DataHook<User> {
    let fetcher: Fetcher<User> = Arc::new(move || {
        let client = client.clone();
        Box::pin(async move { client.current_user().await })
    });
    DataHook::new(fetcher, navigator, None, true)
}

/// Team roster (`GET /team-roster/`). Starts with an empty list.
pub fn operators_hook(client: Arc<ApiClient>, navigator: Arc<dyn Navigator>) -> DataHook<Vec<User>> {
    let fetcher: Fetcher<Vec<User>> = Arc::new(move || {
        let client = client.clone();
        Box::pin(async move { client.fetch_roster().await })
    });
    DataHook::new(fetcher, navigator, Some(Vec::new()), true)
}

/// Any endpoint, sent through the full request pipeline with `options`.
pub fn api_data_hook(
    client: Arc<ApiClient>,
    navigator: Arc<dyn Navigator>,
    endpoint: &str,
    options: RequestOptions,
    fetch_on_mount: bool,
) -> DataHook<Value> {
    let descriptor = Arc::new(RequestDescriptor::new(endpoint, options));
    let fetcher: Fetcher<Value> = Arc::new(move || {
        let client = client.clone();
        let descriptor = descriptor.clone();
        Box::pin(async move { client.send(&descriptor).await })
    });
    DataHook::new(fetcher, navigator, None, fetch_on_mount)
}
