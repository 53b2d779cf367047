//! Session facts that must survive a full-page navigation.
//!
//! The store keeps the selected agent and a single redirect-intent slot. An
//! OAuth login writes its intent immediately before leaving the page and the
//! page handling the callback consumes it.

mod store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionStoreError;

pub use self::store::{FileSessionStore, MemorySessionStore};

/// Facts persisted across redirects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFacts {
    #[serde(default)]
    pub selected_agent_id: Option<String>,
    #[serde(default)]
    pub selected_agent_name: Option<String>,
    #[serde(default)]
    pub redirect_intent: Option<RedirectIntent>,
}

/// Why the page is about to leave for an external flow.
///
/// `LinkAccount` belongs to the account-linking flow; this crate never writes
/// it but clears it when a fresh login starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RedirectIntent {
    OauthLogin {
        provider: String,
        marketing_opt_in: bool,
        agent_id: Option<String>,
    },
    LinkAccount {
        provider: String,
        #[serde(default)]
        return_url: Option<String>,
    },
}

impl RedirectIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OauthLogin { .. } => "oauth-login",
            Self::LinkAccount { .. } => "link-account",
        }
    }
}

/// Persistent key/value surface for [`SessionFacts`].
///
/// Implementations only provide `load` and `modify`; `modify` must apply the
/// closure and persist the result atomically with respect to other callers.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self) -> Result<SessionFacts, SessionStoreError>;

    async fn modify(
        &self,
        apply: &mut (dyn for<'a> FnMut(&'a mut SessionFacts) + Send),
    ) -> Result<SessionFacts, SessionStoreError>;

    async fn remember_selection(
        &self,
        agent_id: &str,
        agent_name: &str,
    ) -> Result<(), SessionStoreError> {
        self.modify(&mut |facts| {
            facts.selected_agent_id = Some(agent_id.to_string());
            facts.selected_agent_name = Some(agent_name.to_string());
        })
        .await?;
        Ok(())
    }

    /// Clear the intent slot and write `intent`, returning what was displaced.
    async fn replace_redirect_intent(
        &self,
        intent: RedirectIntent,
    ) -> Result<Option<RedirectIntent>, SessionStoreError> {
        let mut displaced = None;
        let mut next = Some(intent);
        self.modify(&mut |facts| {
            displaced = facts.redirect_intent.take();
            facts.redirect_intent = next.take();
        })
        .await?;
        Ok(displaced)
    }

    /// Remove and return the pending intent.
    async fn take_redirect_intent(&self) -> Result<Option<RedirectIntent>, SessionStoreError> {
        let mut taken = None;
        self.modify(&mut |facts| {
            taken = facts.redirect_intent.take();
        })
        .await?;
        Ok(taken)
    }

    async fn clear_redirect_intent(&self) -> Result<(), SessionStoreError> {
        self.take_redirect_intent().await.map(|_| ())
    }
}
