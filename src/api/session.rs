use log::info;
use std::fmt;
use std::sync::{Arc, RwLock};

type UnauthorizedHook = Arc<dyn Fn() + Send + Sync>;

/// Credentials shared by every request made through one `ApiClient`.
///
/// A 401 anywhere clears the token and fires the `on_unauthorized` hook; the
/// caller decides what "go back to login" means.
#[derive(Clone)]
pub struct Session {
    token: Arc<RwLock<Option<String>>>,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl Session {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.filter(|t| !t.is_empty()))),
            on_unauthorized: None,
        }
    }

    pub fn on_unauthorized<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub(crate) fn expire(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        info!("session rejected by server, credentials cleared");
        if let Some(hook) = &self.on_unauthorized {
            hook();
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
