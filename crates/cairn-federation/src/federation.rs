//! The federation component: tokens, authorization, proposals and pull
//! results.

use crate::error::{FederationError, Result};
use crate::model::{FederationModel, FederationProposal, FederationSet};
use crate::notify::NotificationSink;
use crate::proposals::ProposalStore;
use crate::request::FederationRequest;
use crate::settings::FederationSettings;
use crate::token::{derive_token, FederationToken};
use cairn_auth::UserModel;
use cairn_registry::Registry;
use cairn_types::{unix_now, FederationStrategy, RepositoryModel};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Path under which repositories are served for cloning.
pub const GIT_PATH: &str = "/r/";

/// Tokens, proposals and pull bookkeeping of this instance.
pub struct Federation {
    settings: FederationSettings,
    registry: Arc<Registry>,
    notifier: Arc<dyn NotificationSink>,
    proposals: ProposalStore,
    registrations: RwLock<Vec<FederationModel>>,
    results: RwLock<HashMap<String, FederationModel>>,
}

impl std::fmt::Debug for Federation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Federation")
            .field("url", &self.settings.url)
            .field("sets", &self.settings.sets)
            .field("proposals", &self.proposals.folder())
            .finish_non_exhaustive()
    }
}

impl Federation {
    /// Creates the component. Registrations are read from `settings`.
    pub fn new(
        settings: FederationSettings,
        registry: Arc<Registry>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let registrations = settings
            .registrations
            .iter()
            .map(|(name, r)| FederationModel::from_settings(name, r, &settings.default_frequency))
            .collect();
        Self {
            proposals: ProposalStore::new(settings.proposals_folder.clone()),
            settings,
            registry,
            notifier,
            registrations: RwLock::new(registrations),
            results: RwLock::new(HashMap::new()),
        }
    }

    /// The settings in use.
    pub fn settings(&self) -> &FederationSettings {
        &self.settings
    }

    /// The registry repositories are offered from and pulled into.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The administrator notification sink.
    pub fn notifier(&self) -> &Arc<dyn NotificationSink> {
        &self.notifier
    }

    /// Whether peers may pull from this instance.
    pub fn can_federate(&self) -> bool {
        !self.settings.passphrase.is_empty()
    }

    /// The token for a standard scope.
    pub fn token(&self, scope: FederationToken) -> String {
        self.token_for(scope.name())
    }

    /// The token for a scope or set name.
    pub fn token_for(&self, value: &str) -> String {
        derive_token(&self.settings.passphrase, value)
    }

    /// Every token of this instance: the standard scopes, then the sets.
    pub fn tokens(&self) -> Vec<String> {
        FederationToken::VALUES
            .iter()
            .map(|scope| self.token(*scope))
            .chain(self.settings.sets.iter().map(|set| self.token_for(set)))
            .collect()
    }

    fn set_for_token(&self, token: &str) -> Option<&str> {
        self.settings
            .sets
            .iter()
            .find(|set| self.token_for(set) == token)
            .map(String::as_str)
    }

    /// Scope of `token`. Set tokens are `Repositories` wide.
    pub fn token_kind(&self, token: &str) -> Option<FederationToken> {
        if !self.can_federate() {
            return None;
        }
        FederationToken::VALUES
            .into_iter()
            .find(|scope| self.token(*scope) == token)
            .or_else(|| self.set_for_token(token).map(|_| FederationToken::Repositories))
    }

    /// Whether `token` grants `request`.
    ///
    /// Always false while federation is disabled.
    pub fn validate(&self, request: FederationRequest, token: &str) -> bool {
        let Some(kind) = self.token_kind(token) else {
            return false;
        };
        match request {
            FederationRequest::PullRepositories => true,
            FederationRequest::PullUsers | FederationRequest::PullTeams => matches!(
                kind,
                FederationToken::All | FederationToken::UsersAndRepositories
            ),
            FederationRequest::PullSettings | FederationRequest::PullScripts => {
                kind == FederationToken::All
            }
            _ => false,
        }
    }

    /// Like [`validate`](Self::validate), as a `Result`.
    pub fn authorize(&self, request: FederationRequest, token: &str) -> Result<()> {
        if !self.can_federate() {
            return Err(FederationError::Disabled("no passphrase configured".into()));
        }
        if self.validate(request, token) {
            Ok(())
        } else {
            Err(FederationError::Unauthorized)
        }
    }

    /// Logs every token of this instance.
    pub fn log_tokens(&self) {
        if !self.can_federate() {
            warn!("federation passphrase is blank, this instance can not be pulled from");
            return;
        }
        for scope in FederationToken::VALUES {
            info!(scope = %scope, token = %self.token(scope), "federation token");
        }
        for set in &self.settings.sets {
            info!(set = %set, token = %self.token_for(set), "federation set token");
        }
    }

    /// Repositories `token` may pull, by clone URL.
    ///
    /// `base_url` is this instance's public URL.
    pub fn repositories(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<BTreeMap<String, RepositoryModel>> {
        let set = self.set_for_token(token);
        let base_url = base_url.trim_end_matches('/');
        let mut repositories = BTreeMap::new();
        for model in self.registry.get_accessible(&UserModel::federation())? {
            let mut url = format!("{}{}{}", base_url, GIT_PATH, model.name);
            match model.federation_strategy {
                FederationStrategy::Exclude => continue,
                FederationStrategy::FederateOrigin => {
                    if let Some(origin) = model.origin.as_deref().filter(|o| !o.is_empty()) {
                        url = origin.to_string();
                    }
                }
                FederationStrategy::FederateThis => {}
            }
            if let Some(set) = set {
                if !model.federation_sets.iter().any(|s| s == set) {
                    continue;
                }
            }
            repositories.insert(url, model);
        }
        Ok(repositories)
    }

    /// Each standard scope and each set with its token and repositories.
    pub fn federation_sets(&self, base_url: &str) -> Result<Vec<FederationSet>> {
        let mut sets = Vec::new();
        for scope in FederationToken::VALUES {
            let token = self.token(scope);
            sets.push(FederationSet {
                name: scope.name().to_string(),
                token_type: scope,
                repositories: self.repositories(base_url, &token)?,
                token,
            });
        }
        for set in &self.settings.sets {
            let token = self.token_for(set);
            sets.push(FederationSet {
                name: set.clone(),
                token_type: FederationToken::Repositories,
                repositories: self.repositories(base_url, &token)?,
                token,
            });
        }
        Ok(sets)
    }

    /// A proposal offering this instance at `base_url` under `token`.
    ///
    /// Tokens that are not a standard scope are proposed as
    /// `Repositories` wide.
    pub fn create_proposal(&self, base_url: &str, token: &str) -> Result<FederationProposal> {
        let token_type = FederationToken::VALUES
            .into_iter()
            .find(|scope| self.token(*scope) == token)
            .unwrap_or(FederationToken::Repositories);
        let repositories = self.repositories(base_url, token)?;
        Ok(FederationProposal::new(
            base_url.trim_end_matches('/'),
            token_type,
            token,
            repositories,
            unix_now(),
        ))
    }

    /// Stores a proposal from a peer and notifies the administrators.
    ///
    /// `base_url` is this instance's public URL, used in the notification.
    pub fn submit_proposal(&self, proposal: &FederationProposal, base_url: &str) -> Result<()> {
        if !self.settings.allow_proposals {
            return Err(FederationError::Disabled("proposals are not accepted".into()));
        }
        self.proposals.save(proposal)?;
        info!(
            url = %proposal.url,
            token = %proposal.token,
            repositories = proposal.repositories.len(),
            "received federation proposal"
        );
        self.notifier.notify_administrators(
            &format!("Federation proposal from {}", proposal.url),
            &format!(
                "Please review the proposal @ {}/proposal/{}",
                base_url.trim_end_matches('/'),
                proposal.token
            ),
        );
        Ok(())
    }

    /// Every pending proposal.
    pub fn pending_proposals(&self) -> Result<Vec<FederationProposal>> {
        self.proposals.list()
    }

    /// The pending proposal named by `token`.
    pub fn pending_proposal(&self, token: &str) -> Result<Option<FederationProposal>> {
        self.proposals.load(token)
    }

    /// Rejects or clears the proposal named by `token`.
    pub fn delete_proposal(&self, token: &str) -> Result<bool> {
        let deleted = self.proposals.delete(token)?;
        if deleted {
            info!(token = %token, "deleted federation proposal");
        }
        Ok(deleted)
    }

    /// Configured registrations with their latest pull state.
    pub fn registrations(&self) -> Vec<FederationModel> {
        self.registrations.read().clone()
    }

    /// Replaces the registration with the same name, or adds it.
    pub fn update_registration(&self, registration: FederationModel) {
        let mut registrations = self.registrations.write();
        match registrations
            .iter_mut()
            .find(|r| r.name == registration.name)
        {
            Some(existing) => *existing = registration,
            None => registrations.push(registration),
        }
    }

    /// Finds a registration, then a reported result, by URL and name.
    pub fn registration(&self, url: &str, name: &str) -> Option<FederationModel> {
        let matches = |r: &&FederationModel| r.url == url && r.name == name;
        if let Some(found) = self.registrations.read().iter().find(matches) {
            return Some(found.clone());
        }
        self.results.read().values().find(matches).cloned()
    }

    /// Records the status a peer reported after pulling from this
    /// instance. A later report for the same peer and folder replaces
    /// the earlier one.
    pub fn acknowledge_status(&self, identification: &str, mut registration: FederationModel) {
        registration.url = identification.to_string();
        let id = if registration.folder.is_empty() {
            identification.to_string()
        } else {
            format!("{}-{}", identification, registration.folder)
        };
        info!(peer = %id, status = %registration.status(), "federation status acknowledged");
        self.results.write().insert(id, registration);
    }

    /// Latest reported result per peer.
    pub fn result_registrations(&self) -> Vec<FederationModel> {
        let mut results: Vec<_> = self.results.read().values().cloned().collect();
        results.sort_by(|a, b| a.url.cmp(&b.url).then(a.folder.cmp(&b.folder)));
        results
    }
}
