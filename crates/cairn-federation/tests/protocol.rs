//! Tokens, repository sets, proposals and acknowledgments.

use cairn_auth::{MemoryUserDirectory, PermissionResolver};
use cairn_federation::{
    Federation, FederationError, FederationModel, FederationProposal, FederationPullStatus,
    FederationRequest, FederationSettings, FederationToken, MemoryNotifier,
};
use cairn_registry::{GcTracker, Registry, RegistrySettings};
use cairn_storage::MemoryStore;
use cairn_types::RepositoryModel;
use std::collections::BTreeMap;
use std::sync::Arc;

const BASE_URL: &str = "https://me.example";

struct Fixture {
    store: Arc<MemoryStore>,
    notifier: Arc<MemoryNotifier>,
    federation: Federation,
    _proposals: tempfile::TempDir,
}

fn setup(passphrase: &str) -> Fixture {
    let proposals = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new(
        RegistrySettings::default(),
        store.clone(),
        store.clone(),
        PermissionResolver::new(Arc::new(MemoryUserDirectory::new())),
        Arc::new(GcTracker::new()),
    ));
    let settings = FederationSettings {
        url: BASE_URL.into(),
        passphrase: passphrase.into(),
        sets: vec!["east".into()],
        proposals_folder: proposals.path().to_path_buf(),
        allow_proposals: true,
        ..Default::default()
    };
    let notifier = Arc::new(MemoryNotifier::new());
    let federation = Federation::new(settings, registry, notifier.clone());
    Fixture {
        store,
        notifier,
        federation,
        _proposals: proposals,
    }
}

fn add_repo(store: &MemoryStore, name: &str) {
    store.add_repository(name, true);
    store.add_commit(name, 1_700_000_000, "alice").unwrap();
}

#[test]
fn test_token_hierarchy() {
    let f = setup("secret");
    let fed = &f.federation;
    let all = fed.token(FederationToken::All);
    let unr = fed.token(FederationToken::UsersAndRepositories);
    let jur = fed.token(FederationToken::Repositories);

    assert!(fed.validate(FederationRequest::PullRepositories, &jur));
    assert!(!fed.validate(FederationRequest::PullUsers, &jur));
    assert!(fed.validate(FederationRequest::PullSettings, &all));
    assert!(!fed.validate(FederationRequest::PullSettings, &unr));

    assert!(fed.validate(FederationRequest::PullRepositories, &all));
    assert!(fed.validate(FederationRequest::PullRepositories, &unr));
    assert!(fed.validate(FederationRequest::PullUsers, &unr));
    assert!(fed.validate(FederationRequest::PullTeams, &all));
    assert!(!fed.validate(FederationRequest::PullTeams, &jur));
    assert!(fed.validate(FederationRequest::PullScripts, &all));
    assert!(!fed.validate(FederationRequest::PullScripts, &unr));

    assert!(!fed.validate(FederationRequest::PullRepositories, "not-a-token"));
    assert!(!fed.validate(FederationRequest::Poke, &all));
    assert!(!fed.validate(FederationRequest::Status, &all));
}

#[test]
fn test_set_tokens_only_pull_repositories() {
    let f = setup("secret");
    let fed = &f.federation;
    let east = fed.token_for("east");
    assert!(fed.validate(FederationRequest::PullRepositories, &east));
    assert!(!fed.validate(FederationRequest::PullUsers, &east));
    assert!(!fed.validate(FederationRequest::PullSettings, &east));
    assert_eq!(fed.token_kind(&east), Some(FederationToken::Repositories));
    assert_eq!(fed.tokens().len(), 4);
}

#[test]
fn test_unknown_request_is_rejected() {
    let f = setup("secret");
    let all = f.federation.token(FederationToken::All);
    let accepted = FederationRequest::from_name("PULL_EVERYTHING")
        .is_some_and(|request| f.federation.validate(request, &all));
    assert!(!accepted);
}

#[test]
fn test_blank_passphrase_disables_federation() {
    let f = setup("");
    let fed = &f.federation;
    assert!(!fed.can_federate());
    let all = fed.token(FederationToken::All);
    assert!(!fed.validate(FederationRequest::PullRepositories, &all));
    assert!(matches!(
        fed.authorize(FederationRequest::PullRepositories, &all),
        Err(FederationError::Disabled(_))
    ));
}

#[test]
fn test_authorize_does_not_reveal_scope() {
    let f = setup("secret");
    let jur = f.federation.token(FederationToken::Repositories);
    assert!(f
        .federation
        .authorize(FederationRequest::PullRepositories, &jur)
        .is_ok());
    assert!(matches!(
        f.federation.authorize(FederationRequest::PullUsers, &jur),
        Err(FederationError::Unauthorized)
    ));
}

#[test]
fn test_repositories_follow_strategy_and_sets() {
    let f = setup("secret");
    add_repo(&f.store, "a.git");
    add_repo(&f.store, "b.git");
    add_repo(&f.store, "c.git");
    add_repo(&f.store, "d.git");
    f.store
        .set_config_value("b.git", "cairn.federationStrategy", "EXCLUDE")
        .unwrap();
    f.store
        .set_config_value("c.git", "cairn.federationStrategy", "FEDERATE_ORIGIN")
        .unwrap();
    f.store
        .set_config_value("c.git", "remote.origin.url", "https://upstream.example/c.git")
        .unwrap();
    f.store
        .set_config_value("d.git", "cairn.federationSets", "east")
        .unwrap();

    let all = f.federation.token(FederationToken::All);
    let repositories = f.federation.repositories(BASE_URL, &all).unwrap();
    let urls: Vec<_> = repositories.keys().cloned().collect();
    assert_eq!(
        urls,
        vec![
            "https://me.example/r/a.git",
            "https://me.example/r/d.git",
            "https://upstream.example/c.git",
        ]
    );

    let east = f.federation.token_for("east");
    let repositories = f.federation.repositories(BASE_URL, &east).unwrap();
    let names: Vec<_> = repositories.values().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["d.git"]);

    let sets = f.federation.federation_sets(BASE_URL).unwrap();
    assert_eq!(sets.len(), 4);
    assert_eq!(sets[3].name, "east");
    assert_eq!(sets[3].repositories.len(), 1);
    assert_eq!(sets[0].token_type, FederationToken::All);
    assert_eq!(sets[0].repositories.len(), 3);
}

#[test]
fn test_create_proposal() {
    let f = setup("secret");
    add_repo(&f.store, "a.git");

    let all = f.federation.token(FederationToken::All);
    let proposal = f.federation.create_proposal(BASE_URL, &all).unwrap();
    assert_eq!(proposal.token_type, FederationToken::All);
    assert_eq!(proposal.url, BASE_URL);
    assert_eq!(proposal.repositories.len(), 1);

    let east = f.federation.token_for("east");
    let proposal = f.federation.create_proposal(BASE_URL, &east).unwrap();
    assert_eq!(proposal.token_type, FederationToken::Repositories);
    assert!(proposal.repositories.is_empty());
}

#[test]
fn test_proposal_round_trip() {
    let f = setup("secret");
    let mut repositories = BTreeMap::new();
    repositories.insert(
        "https://peer.example/r/a.git".to_string(),
        RepositoryModel::new("a.git"),
    );
    repositories.insert(
        "https://peer.example/r/b.git".to_string(),
        RepositoryModel::new("b.git"),
    );
    let proposal = FederationProposal::new(
        "https://peer.example",
        FederationToken::Repositories,
        "T1",
        repositories,
        1_700_000_000,
    );

    f.federation.submit_proposal(&proposal, BASE_URL).unwrap();
    let file = f
        .federation
        .settings()
        .proposals_folder
        .join("T1.proposal");
    assert!(file.is_file());

    let pending = f.federation.pending_proposal("T1").unwrap().unwrap();
    let names: Vec<_> = pending.repositories.values().map(|m| m.name.clone()).collect();
    assert_eq!(names, vec!["a.git", "b.git"]);
    assert_eq!(f.federation.pending_proposals().unwrap().len(), 1);

    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "Federation proposal from https://peer.example");
    assert_eq!(
        sent[0].1,
        "Please review the proposal @ https://me.example/proposal/T1"
    );

    assert!(f.federation.delete_proposal("T1").unwrap());
    assert!(f.federation.pending_proposal("T1").unwrap().is_none());
    assert!(!file.exists());
}

#[test]
fn test_proposals_can_be_refused() {
    let proposals = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new(
        RegistrySettings::default(),
        store.clone(),
        store,
        PermissionResolver::new(Arc::new(MemoryUserDirectory::new())),
        Arc::new(GcTracker::new()),
    ));
    let settings = FederationSettings {
        proposals_folder: proposals.path().to_path_buf(),
        ..Default::default()
    };
    let federation = Federation::new(settings, registry, Arc::new(MemoryNotifier::new()));
    let proposal = FederationProposal::new(
        "https://peer.example",
        FederationToken::All,
        "T2",
        BTreeMap::new(),
        0,
    );
    assert!(matches!(
        federation.submit_proposal(&proposal, BASE_URL),
        Err(FederationError::Disabled(_))
    ));
    assert!(federation.pending_proposals().unwrap().is_empty());
}

#[test]
fn test_acknowledged_status_keeps_latest_per_peer() {
    let f = setup("secret");
    let mut report = FederationModel::new("me", BASE_URL, "tok");
    report.update_status("a.git", FederationPullStatus::Failed);
    f.federation.acknowledge_status("peer-1", report.clone());

    report.update_status("a.git", FederationPullStatus::Pulled);
    f.federation.acknowledge_status("peer-1", report.clone());

    let results = f.federation.result_registrations();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "peer-1");
    assert_eq!(results[0].status(), FederationPullStatus::Pulled);

    report.folder = "mirrors".into();
    f.federation.acknowledge_status("peer-1", report);
    assert_eq!(f.federation.result_registrations().len(), 2);

    let found = f.federation.registration("peer-1", "me").unwrap();
    assert_eq!(found.url, "peer-1");
    assert!(f.federation.registration("peer-2", "me").is_none());
}
