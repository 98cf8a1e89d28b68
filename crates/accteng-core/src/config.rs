use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;

/// Configuration for one account-engine process, loaded from a TOML file
/// merged with `ACCTENG_`-prefixed environment overrides. Every field here is
/// either a domain item named in the external-interfaces configuration table
/// or ambient scaffolding needed to actually run the binary (database path,
/// listen port, optional proxy/relay/TLS targets).
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Account identifier (`did:web:...` or `did:plc:...`). Immutable.
    pub did: String,
    /// Human handle, e.g. `alice.example.com`.
    pub handle: String,
    /// Public hostname this PDS is served from.
    pub pds_hostname: String,
    /// Listen port for the HTTP/WS server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// secp256k1 signing key material, hex-encoded.
    pub signing_key: String,
    /// Multibase-encoded public key, published in the DID document.
    pub signing_key_public: String,
    /// HS256 secret for session access/refresh JWTs.
    pub jwt_secret: String,
    /// Static bearer token accepted for backward compatibility.
    pub auth_token: String,
    /// bcrypt hash of the account password; required for password login.
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Local filesystem path for the blob store; blob APIs are disabled
    /// (`ServiceUnavailable`) when absent.
    #[serde(default)]
    pub blobs: Option<String>,
    /// Whether a freshly initialized account starts active.
    #[serde(default = "default_true")]
    pub initial_active: bool,
    /// Embedded relational store connection string.
    pub database_url: String,
    /// Ambient: optional AppView fallback-proxy target.
    #[serde(default)]
    pub appview_url: Option<String>,
    #[serde(default)]
    pub appview_did: Option<String>,
    /// Ambient: optional relay/BGS crawl-notify target.
    #[serde(default)]
    pub relay_url: Option<String>,
    /// Ambient: optional TLS/ACME configuration.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Ambient: OAuth-specific knobs that don't belong in the domain model.
    #[serde(default)]
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub domains: Vec<String>,
    pub contact_email: String,
    #[serde(default = "default_cert_cache")]
    pub cert_cache: String,
    #[serde(default)]
    pub production: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    /// DPoP proof `iat` clock-skew tolerance, seconds.
    #[serde(default = "default_dpop_skew")]
    pub dpop_iat_skew_secs: i64,
    /// How often the cleanup alarm sweeps expired OAuth rows, seconds.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            dpop_iat_skew_secs: default_dpop_skew(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_cert_cache() -> String {
    "data/certs".to_string()
}

fn default_dpop_skew() -> i64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

impl EngineConfig {
    pub fn load(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ACCTENG_").split("__"))
            .extract()
    }
}
