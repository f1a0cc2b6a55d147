use super::*;
use std::collections::HashMap;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Build from an inline YAML document and a fake environment.
fn load(yaml: &str, env: &HashMap<String, String>) -> anyhow::Result<ServiceConfig> {
    let builder = config::Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
    let prefixed: config::Map<String, String> = env
        .iter()
        .filter(|(k, _)| k.starts_with("JA__"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let environment = Environment::with_prefix(ENV_PREFIX)
        .separator(ENV_SEPARATOR)
        .source(Some(prefixed));

    assemble(builder, environment, |name| env.get(name).cloned())
}

#[test]
fn test_prefixed_name() {
    assert_eq!(prefixed_name("server.port"), "JA__SERVER__PORT");
    assert_eq!(
        prefixed_name("upstream.client_id"),
        "JA__UPSTREAM__CLIENT_ID"
    );
}

#[test]
fn test_file_format_from_extension() {
    assert_eq!(file_format("/tmp/service.json"), FileFormat::Json);
    assert_eq!(file_format("/tmp/service.yaml"), FileFormat::Yaml);
    assert_eq!(file_format("/tmp/service"), FileFormat::Yaml);
}

/// Verify that nothing configured still produces a usable configuration.
#[test]
fn test_empty_sources_use_defaults() {
    let config = load("", &HashMap::new()).unwrap();

    assert_eq!(config.server.port, 3000);
    assert_eq!(config.collections.audit_key, "CustomActivity_Log");
    assert!(config.upstream.client_id.is_none());
}

#[test]
fn test_file_values_are_read() {
    let yaml = "server:\n  port: 4000\ncollections:\n  target_key: FROM_FILE\n";

    let config = load(yaml, &HashMap::new()).unwrap();

    assert_eq!(config.server.port, 4000);
    assert_eq!(config.collections.target_key, "FROM_FILE");
}

#[test]
fn test_prefixed_environment_overrides_file() {
    let yaml = "server:\n  port: 4000\n";
    let env = vars(&[("JA__SERVER__PORT", "5000")]);

    let config = load(yaml, &env).unwrap();

    assert_eq!(config.server.port, 5000);
}

/// Verify that flat deployment variables map onto their nested keys.
#[test]
fn test_legacy_variables_are_mapped() {
    let env = vars(&[
        ("PORT", "6000"),
        ("JWT_SECRET", "s3cret"),
        ("SFMC_CLIENT_ID", "client"),
        ("SFMC_CLIENT_SECRET", "secret"),
        ("SFMC_SUBDOMAIN", "mc123"),
        ("DE_EXTERNAL_KEY", "MASTER_KEY"),
        ("ACTIVITY_LOG_DE_KEY", "LOG_KEY"),
    ]);

    let config = load("", &env).unwrap();

    assert_eq!(config.server.port, 6000);
    assert_eq!(config.security.jwt_secret.as_deref(), Some("s3cret"));
    assert_eq!(config.upstream.client_id.as_deref(), Some("client"));
    assert_eq!(config.upstream.subdomain.as_deref(), Some("mc123"));
    assert_eq!(config.collections.target_key, "MASTER_KEY");
    assert_eq!(config.collections.audit_key, "LOG_KEY");
}

#[test]
fn test_prefixed_variable_shadows_legacy_variable() {
    let env = vars(&[("PORT", "6000"), ("JA__SERVER__PORT", "7000")]);

    let overrides = legacy_overrides(&|name: &str| env.get(name).cloned());
    let config = load("", &env).unwrap();

    assert!(overrides.iter().all(|(variable, _)| *variable != "PORT"));
    assert_eq!(config.server.port, 7000);
}

#[test]
fn test_blank_legacy_variable_is_ignored() {
    let env = vars(&[("DE_EXTERNAL_KEY", "   ")]);

    let overrides = legacy_overrides(&|name: &str| env.get(name).cloned());

    assert!(overrides.is_empty());
}

#[test]
fn test_unparseable_value_is_an_error() {
    let env = vars(&[("PORT", "not-a-port")]);

    assert!(load("", &env).is_err());
}
