//! Fork graph consistency across create, fork, rename and delete.

use cairn_auth::{MemoryUserDirectory, PermissionResolver, UserDirectory, UserModel};
use cairn_registry::{GcTracker, Registry, RegistrySettings, RetryPolicy};
use cairn_storage::MemoryStore;
use cairn_types::{AccessPermission, RepositoryModel};
use proptest::prelude::*;
use std::sync::Arc;

struct Fixture {
    store: Arc<MemoryStore>,
    directory: Arc<MemoryUserDirectory>,
    registry: Registry,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    let registry = Registry::new(
        RegistrySettings::default(),
        store.clone(),
        store.clone(),
        PermissionResolver::new(directory.clone()),
        Arc::new(GcTracker::new()),
    )
    .with_retry_policy(RetryPolicy::immediate(3));
    Fixture {
        store,
        directory,
        registry,
    }
}

fn add_repo(store: &MemoryStore, name: &str) {
    store.add_repository(name, true);
    store.add_commit(name, 1_700_000_000, "alice").unwrap();
}

fn models(registry: &Registry) -> Vec<RepositoryModel> {
    registry
        .list()
        .unwrap()
        .iter()
        .filter_map(|name| registry.get(name).unwrap())
        .collect()
}

fn check_symmetry(registry: &Registry) -> Result<(), TestCaseError> {
    let models = models(registry);
    let find = |name: &str| models.iter().find(|m| m.name.eq_ignore_ascii_case(name));
    for model in &models {
        if let Some(origin) = model.origin_repository.as_deref().and_then(find) {
            prop_assert!(
                origin.forks.contains(&model.name),
                "{} is missing fork {}",
                origin.name,
                model.name
            );
        }
        for fork in &model.forks {
            let points_back = find(fork).is_some_and(|f| f.is_fork_of(&model.name));
            prop_assert!(points_back, "{} lists {} which is not its fork", model.name, fork);
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Op {
    Fork(usize),
    Rename(usize),
    Delete(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..16usize).prop_map(Op::Fork),
        2 => (0..16usize).prop_map(Op::Rename),
        1 => (0..16usize).prop_map(Op::Delete),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every origin lists exactly the repositories pointing at it.
    #[test]
    fn prop_fork_links_stay_symmetric(ops in prop::collection::vec(op_strategy(), 1..20)) {
        let f = fixture();
        add_repo(&f.store, "proj/a.git");
        add_repo(&f.store, "proj/b.git");

        for (step, op) in ops.into_iter().enumerate() {
            let names = f.registry.list().unwrap();
            if names.is_empty() {
                break;
            }
            match op {
                Op::Fork(i) => {
                    let origin = f.registry.get(&names[i % names.len()]).unwrap().unwrap();
                    let user = UserModel::new(format!("user{}", step));
                    f.registry.fork(&origin, &user).unwrap();
                }
                Op::Rename(i) => {
                    let old = names[i % names.len()].clone();
                    let mut model = f.registry.get(&old).unwrap().unwrap();
                    model.set_name(format!("proj/renamed{}.git", step));
                    f.registry.update_repository_model(&old, model, false).unwrap();
                    prop_assert!(!f.registry.has_repository(&old));
                }
                Op::Delete(i) => {
                    f.registry.delete_repository(&names[i % names.len()]).unwrap();
                }
            }
            check_symmetry(&f.registry)?;
        }
    }
}

#[test]
fn test_rename_origin_with_fork() {
    let f = fixture();
    add_repo(&f.store, "proj/a.git");
    add_repo(&f.store, "alice/a.git");
    f.store
        .set_config_value("alice/a.git", "cairn.originRepository", "proj/a.git")
        .unwrap();
    f.store
        .set_config_value("alice/a.git", "remote.origin.url", "memory://proj/a.git")
        .unwrap();
    f.directory
        .update_user(UserModel::new("bob").with_permission("proj/a.git", AccessPermission::Push))
        .unwrap();

    let mut model = f.registry.get("proj/a.git").unwrap().unwrap();
    assert_eq!(model.forks.iter().collect::<Vec<_>>(), vec!["alice/a.git"]);
    model.set_name("proj/b.git");
    let renamed = f
        .registry
        .update_repository_model("proj/a.git", model, false)
        .unwrap();
    assert_eq!(renamed.name, "proj/b.git");

    let fork = f.registry.get("alice/a.git").unwrap().unwrap();
    assert_eq!(fork.origin_repository.as_deref(), Some("proj/b.git"));
    let origin = f.registry.get("proj/b.git").unwrap().unwrap();
    assert_eq!(origin.forks.iter().collect::<Vec<_>>(), vec!["alice/a.git"]);
    assert!(f.registry.get("proj/a.git").unwrap().is_none());
    assert!(!f.registry.list().unwrap().contains(&"proj/a.git".to_string()));

    let config = f.store.config("alice/a.git").unwrap();
    assert_eq!(config.get("cairn.originRepository"), Some("proj/b.git"));
    assert_eq!(config.get("remote.origin.url"), Some("memory://proj/b.git"));

    let bob = f.directory.user("bob").unwrap();
    assert_eq!(bob.explicit_permission("proj/b.git"), Some(AccessPermission::Push));
    assert_eq!(bob.explicit_permission("proj/a.git"), None);
}

#[test]
fn test_failed_rename_leaves_cache_untouched() {
    let f = fixture();
    add_repo(&f.store, "proj/a.git");
    add_repo(&f.store, "~alice/a.git");
    f.store
        .set_config_value("~alice/a.git", "cairn.originRepository", "proj/a.git")
        .unwrap();
    f.registry.list().unwrap();
    f.store.fail_next_renames(u32::MAX);

    let mut model = f.registry.get("proj/a.git").unwrap().unwrap();
    model.set_name("proj/b.git");
    assert!(f
        .registry
        .update_repository_model("proj/a.git", model, false)
        .is_err());

    assert_eq!(f.registry.list().unwrap(), vec!["proj/a.git", "~alice/a.git"]);
    let fork = f.registry.get("~alice/a.git").unwrap().unwrap();
    assert_eq!(fork.origin_repository.as_deref(), Some("proj/a.git"));
}
