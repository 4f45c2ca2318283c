//! Conversion between repository models and their stored configuration.

use crate::settings::RegistrySettings;
use cairn_storage::RepositoryConfig;
use cairn_types::{
    parse_size, AccessRestriction, AuthorizationControl, FederationStrategy, RepositoryModel,
};

const DESCRIPTION: &str = "cairn.description";
pub(crate) const ORIGIN_REPOSITORY: &str = "cairn.originRepository";
const OWNER: &str = "cairn.owner";
const ALLOW_FORKS: &str = "cairn.allowForks";
const ACCESS_RESTRICTION: &str = "cairn.accessRestriction";
const AUTHORIZATION_CONTROL: &str = "cairn.authorizationControl";
const IS_FROZEN: &str = "cairn.isFrozen";
const SKIP_SIZE_CALCULATION: &str = "cairn.skipSizeCalculation";
const FEDERATION_STRATEGY: &str = "cairn.federationStrategy";
const FEDERATION_SETS: &str = "cairn.federationSets";
const IS_FEDERATED: &str = "cairn.isFederated";
const GC_THRESHOLD: &str = "cairn.gcThreshold";
const GC_PERIOD: &str = "cairn.gcPeriod";
const LAST_GC: &str = "cairn.lastGC";

/// Remote URL the repository was cloned from.
pub const ORIGIN_URL: &str = "remote.origin.url";
const ORIGIN_MIRROR: &str = "remote.origin.mirror";

/// Builds a model from stored configuration, filling gaps from `settings`.
///
/// Volatile fields (size, last change, commit presence) are left for the
/// caller to fill from the store.
pub fn model_from_config(
    name: &str,
    is_bare: bool,
    config: &RepositoryConfig,
    settings: &RegistrySettings,
) -> RepositoryModel {
    let mut model = RepositoryModel::new(name);
    model.is_bare = is_bare;
    model.description = config.get_or(DESCRIPTION, "").to_string();
    model.origin_repository = config
        .get(ORIGIN_REPOSITORY)
        .filter(|o| !o.is_empty())
        .map(str::to_string);
    for owner in config.get_list(OWNER) {
        model.add_owner(owner);
    }
    model.allow_forks = config.get_bool(ALLOW_FORKS, true);
    model.access_restriction = config
        .get(ACCESS_RESTRICTION)
        .and_then(AccessRestriction::from_name)
        .unwrap_or(settings.default_access_restriction);
    model.authorization_control = config
        .get(AUTHORIZATION_CONTROL)
        .and_then(AuthorizationControl::from_name)
        .unwrap_or(settings.default_authorization_control);
    model.is_frozen = config.get_bool(IS_FROZEN, false);
    model.skip_size_calculation = config.get_bool(SKIP_SIZE_CALCULATION, false);
    model.federation_strategy = config
        .get(FEDERATION_STRATEGY)
        .and_then(FederationStrategy::from_name)
        .unwrap_or_default();
    model.federation_sets = config.get_list(FEDERATION_SETS);
    model.is_federated = config.get_bool(IS_FEDERATED, false);
    model.gc_threshold = config
        .get(GC_THRESHOLD)
        .and_then(parse_size)
        .unwrap_or_else(|| settings.gc_threshold_bytes());
    model.gc_period = match config.get_int(GC_PERIOD, 0) {
        period if period > 0 => u32::try_from(period).unwrap_or(settings.default_gc_period),
        _ => settings.default_gc_period,
    };
    model.last_gc = config.get_int(LAST_GC, 0).max(0) as u64;
    model.origin = config
        .get(ORIGIN_URL)
        .filter(|o| !o.is_empty())
        .map(str::to_string);
    model.is_mirror = config.get_bool(ORIGIN_MIRROR, false);
    model.custom_fields = config.custom_fields();
    model
}

/// Writes the persisted fields of `model` into `config`.
///
/// Keys not owned by the model are left untouched. Values equal to the
/// instance defaults are unset so that changing a default applies to
/// every repository that never overrode it.
pub fn write_model(
    config: &mut RepositoryConfig,
    model: &RepositoryModel,
    settings: &RegistrySettings,
) {
    config.set_or_unset(DESCRIPTION, Some(&model.description));
    config.set_or_unset(ORIGIN_REPOSITORY, model.origin_repository.as_deref());
    config.set_list(OWNER, model.owners.iter());
    config.set_bool(ALLOW_FORKS, model.allow_forks);
    config.set(ACCESS_RESTRICTION, model.access_restriction.name());
    config.set(AUTHORIZATION_CONTROL, model.authorization_control.name());
    config.set_bool(IS_FROZEN, model.is_frozen);
    config.set_bool(SKIP_SIZE_CALCULATION, model.skip_size_calculation);
    config.set(FEDERATION_STRATEGY, model.federation_strategy.name());
    config.set_list(FEDERATION_SETS, model.federation_sets.iter());
    config.set_bool(IS_FEDERATED, model.is_federated);

    if model.gc_threshold == settings.gc_threshold_bytes() {
        config.unset(GC_THRESHOLD);
    } else {
        config.set(GC_THRESHOLD, model.gc_threshold.to_string());
    }
    if model.gc_period == settings.default_gc_period {
        config.unset(GC_PERIOD);
    } else {
        config.set(GC_PERIOD, model.gc_period.to_string());
    }
    if model.last_gc > 0 {
        config.set(LAST_GC, model.last_gc.to_string());
    }
    config.set_or_unset(ORIGIN_URL, model.origin.as_deref());
    config.set_custom_fields(&model.custom_fields);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_defaults_from_settings() {
        let settings = RegistrySettings {
            default_access_restriction: AccessRestriction::View,
            default_gc_period: 3,
            default_gc_threshold: "1MB".to_string(),
            ..RegistrySettings::default()
        };
        let model = model_from_config("proj/a.git", true, &RepositoryConfig::new(), &settings);
        assert_eq!(model.access_restriction, AccessRestriction::View);
        assert_eq!(model.authorization_control, AuthorizationControl::Named);
        assert_eq!(model.gc_period, 3);
        assert_eq!(model.gc_threshold, 1024 * 1024);
        assert!(model.allow_forks);
        assert!(model.origin_repository.is_none());
        assert_eq!(model.project_path, "proj");
    }

    #[test]
    fn test_write_then_read_preserves_fields() {
        let settings = RegistrySettings::default();
        let mut model = RepositoryModel::new("proj/a.git")
            .with_description("a repository")
            .with_origin_repository("proj/upstream.git")
            .with_owner("Alice")
            .with_owner("bob");
        model.access_restriction = AccessRestriction::Clone;
        model.is_frozen = true;
        model.federation_strategy = FederationStrategy::FederateOrigin;
        model.federation_sets = vec!["mirrors".to_string()];
        model.gc_threshold = 2048;
        model.gc_period = 14;
        model.last_gc = 1_700_000_000;
        model.origin = Some("https://example.com/a.git".to_string());
        model.custom_fields = BTreeMap::from([("team".to_string(), "core".to_string())]);

        let mut config = RepositoryConfig::new();
        write_model(&mut config, &model, &settings);
        assert_eq!(config.get("custom.team"), Some("core"));
        assert_eq!(config.get(OWNER), Some("alice,bob"));

        let read = model_from_config("proj/a.git", true, &config, &settings);
        assert_eq!(read.description, "a repository");
        assert_eq!(read.origin_repository.as_deref(), Some("proj/upstream.git"));
        assert!(read.is_owner("alice") && read.is_owner("bob"));
        assert_eq!(read.access_restriction, AccessRestriction::Clone);
        assert!(read.is_frozen);
        assert_eq!(read.federation_strategy, FederationStrategy::FederateOrigin);
        assert_eq!(read.federation_sets, vec!["mirrors".to_string()]);
        assert_eq!(read.gc_threshold, 2048);
        assert_eq!(read.gc_period, 14);
        assert_eq!(read.last_gc, 1_700_000_000);
        assert_eq!(read.origin.as_deref(), Some("https://example.com/a.git"));
        assert_eq!(read.custom_fields, model.custom_fields);
    }

    #[test]
    fn test_defaults_are_not_pinned() {
        let settings = RegistrySettings::default();
        let mut model = RepositoryModel::new("a.git");
        model.gc_threshold = settings.gc_threshold_bytes();
        model.gc_period = settings.default_gc_period;

        let mut config = RepositoryConfig::new();
        config.set(GC_PERIOD, "30");
        write_model(&mut config, &model, &settings);
        assert_eq!(config.get(GC_PERIOD), None);
        assert_eq!(config.get(GC_THRESHOLD), None);
        assert_eq!(config.get(ORIGIN_REPOSITORY), None);
    }

    #[test]
    fn test_oversized_gc_period_falls_back_to_default() {
        let settings = RegistrySettings {
            default_gc_period: 7,
            ..RegistrySettings::default()
        };
        let mut config = RepositoryConfig::new();
        config.set(GC_PERIOD, "4294967297");
        let model = model_from_config("a.git", true, &config, &settings);
        assert_eq!(model.gc_period, 7);
    }

    #[test]
    fn test_clearing_origin_unsets_key() {
        let settings = RegistrySettings::default();
        let mut config = RepositoryConfig::new();
        config.set(ORIGIN_REPOSITORY, "proj/a.git");
        config.set("core.bare", "true");
        write_model(&mut config, &RepositoryModel::new("b.git"), &settings);
        assert_eq!(config.get(ORIGIN_REPOSITORY), None);
        assert_eq!(config.get("core.bare"), Some("true"));
    }
}
