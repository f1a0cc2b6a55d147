//! Layered configuration loading.
//!
//! Sources, later ones overriding earlier ones:
//!  1. `/etc/journey-activity/service.yaml`
//!  2. `./config/service.yaml`
//!  3. The file named by `JA_CONFIG_FILE`, which must exist when set
//!  4. Environment variables prefixed `JA__` (double-underscore separator),
//!     e.g. `JA__SERVER__PORT=9090` sets `server.port`
//!  5. Flat deployment variables such as `PORT` or `SFMC_CLIENT_ID`, applied
//!     only when the matching `JA__` variable is absent
//!
//! Every field carries a serde default, so an unconfigured environment
//! produces a runnable service.

use anyhow::Context;
use config::{builder::DefaultState, ConfigBuilder, Environment, File, FileFormat};
use journey_activity_api::ServiceConfig;
use tracing::{debug, info};

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

const ENV_PREFIX: &str = "JA";
const ENV_SEPARATOR: &str = "__";
const CONFIG_FILE_VARIABLE: &str = "JA_CONFIG_FILE";

/// Flat variable names used by existing deployments and the key each one sets.
const LEGACY_VARIABLES: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("JWT_SECRET", "security.jwt_secret"),
    ("APP_EXTENSION_KEY", "security.app_extension_key"),
    ("SFMC_CLIENT_ID", "upstream.client_id"),
    ("SFMC_CLIENT_SECRET", "upstream.client_secret"),
    ("SFMC_SUBDOMAIN", "upstream.subdomain"),
    ("SFMC_ACCOUNT_ID", "upstream.account_id"),
    ("SFMC_AUTH_URL", "upstream.auth_url"),
    ("SFMC_REST_BASE_URL", "upstream.rest_base_url"),
    ("DE_EXTERNAL_KEY", "collections.target_key"),
    ("DE_NAME", "collections.target_name"),
    ("ACTIVITY_LOG_DE_KEY", "collections.audit_key"),
    ("ACTIVITY_LOG_DE_NAME", "collections.audit_name"),
];

/// Load the service configuration from files and the process environment.
pub fn load_configuration() -> anyhow::Result<ServiceConfig> {
    let mut builder = config::Config::builder()
        .add_source(
            File::with_name("/etc/journey-activity/service")
                .required(false)
                .format(FileFormat::Yaml),
        )
        .add_source(
            File::with_name("config/service")
                .required(false)
                .format(FileFormat::Yaml),
        );

    if let Some(explicit_path) = std::env::var(CONFIG_FILE_VARIABLE)
        .ok()
        .filter(|p| !p.is_empty())
    {
        builder = builder.add_source(
            File::with_name(&explicit_path)
                .required(true)
                .format(file_format(&explicit_path)),
        );
        info!(path = %explicit_path, "Loading configuration from explicit path");
    }

    assemble(
        builder,
        Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR),
        |name| std::env::var(name).ok(),
    )
}

/// Apply the environment layers on top of `builder` and deserialize.
fn assemble<F>(
    builder: ConfigBuilder<DefaultState>,
    environment: Environment,
    lookup: F,
) -> anyhow::Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = builder.add_source(environment);

    for (variable, key) in legacy_overrides(&lookup) {
        debug!(variable, key, "Applying deployment variable");
        builder = builder
            .set_override(key, value_for(&lookup, variable))
            .with_context(|| format!("Failed to apply {} to {}", variable, key))?;
    }

    builder
        .build()
        .context("Failed to build configuration")?
        .try_deserialize::<ServiceConfig>()
        .context("Could not deserialize service configuration")
}

/// Legacy variables that are set and not shadowed by a prefixed variable.
fn legacy_overrides<F>(lookup: &F) -> Vec<(&'static str, &'static str)>
where
    F: Fn(&str) -> Option<String>,
{
    LEGACY_VARIABLES
        .iter()
        .filter(|(variable, key)| {
            lookup(&prefixed_name(key)).is_none() && !value_for(lookup, variable).is_empty()
        })
        .copied()
        .collect()
}

fn value_for<F>(lookup: &F, variable: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(variable).map(|v| v.trim().to_string()).unwrap_or_default()
}

/// `server.port` becomes `JA__SERVER__PORT`.
fn prefixed_name(key: &str) -> String {
    format!(
        "{}{}{}",
        ENV_PREFIX,
        ENV_SEPARATOR,
        key.to_uppercase().replace('.', ENV_SEPARATOR)
    )
}

fn file_format(path: &str) -> FileFormat {
    if path.ends_with(".json") {
        FileFormat::Json
    } else {
        FileFormat::Yaml
    }
}
