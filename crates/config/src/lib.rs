//! Configuration loading, layering, and validation.
//!
//! Config files: `conclave.toml`, `conclave.yaml`, or `conclave.json`,
//! searched in `./` then `~/.config/conclave/`. A `conclave.local.*` file in
//! the same directory overrides the base file, and `CONCLAVE_*` environment
//! variables override both. Layers deep-merge: nested tables merge key by
//! key, scalars and arrays replace.
//!
//! Supports `${ENV_VAR}` substitution in file contents.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, discover_and_load, load_config, load_layered},
    schema::{
        ApiTokenConfig, ConclaveConfig, CorsConfig, DatabaseConfig, DiscussionConfig,
        IdentificationConfig, JwtConfig, LogConfig, LogFormat, RateLimitConfig, ServerConfig,
        SessionsConfig, SslConfig,
    },
    validate::{Diagnostic, Severity, validate},
};
