// src/constants.rs

/// Environment variable holding the path to the infrastructure model file.
pub const APP_MODEL_VAR: &str = "NUOPS_APP_MODEL";

/// Environment variable naming the environment to pre-select.
pub const CURRENT_ENVIRONMENT_VAR: &str = "NUOPS_CURRENT_ENVIRONMENT";

/// Suffix appended to a service's full name to find its config template.
pub const TEMPLATE_SUFFIX: &str = ".cscfg.template";

/// Folder (under the user's local data dir) where the token cache lives.
pub const APP_DATA_DIR: &str = "nuops";

/// Sub-folder of [`APP_DATA_DIR`] holding one token file per tenant.
pub const TOKEN_STORE_DIR: &str = "tokens";

/// Prefix of the per-service admin credential secret.
pub const ADMIN_SECRET_PREFIX: &str = "http.admin:";

/// Prefix of certificate secrets.
pub const CERT_SECRET_PREFIX: &str = "cert:";

/// Resource type tag for storage accounts.
pub const AZURE_STORAGE_TYPE: &str = "azureStorage";

/// Resource type tag for SQL databases.
pub const SQL_DB_TYPE: &str = "sqldb";

/// Tokens closer than this to their expiry are treated as expired.
pub const TOKEN_EXPIRY_SKEW_SECS: i64 = 300;
