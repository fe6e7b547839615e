//! Credential and region resolution (§4.3): explicit → environment → shared
//! credentials file → anonymous, first success wins.

mod file;

pub use file::{parse_credentials_file, CredentialsFileError, Profile};

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::region::Region;

/// A resolved `(accessKeyId, secretAccessKey, sessionToken?)` triple, plus
/// an optional expiry the core itself never acts on (no refresh/rotation;
/// callers that need STS-style rotation layer it on top, per §1 non-goals).
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: Option<chrono::DateTime<chrono::Utc>>,
}

impl Credential {
    pub fn anonymous() -> Self {
        Credential {
            access_key_id: String::new(),
            secret_access_key: String::new(),
            session_token: None,
            expiration: None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.access_key_id.is_empty() && self.secret_access_key.is_empty()
    }
}

/// Secrets are never logged (§5 "Shared resources"): `Debug` redacts both
/// keys and the session token.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expiration", &self.expiration)
            .finish()
    }
}

fn redact(access_key_id: &str) -> String {
    if access_key_id.len() <= 4 {
        "<redacted>".to_string()
    } else {
        format!("{}…", &access_key_id[..4])
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("shared credentials file error: {0}")]
    File(#[from] CredentialsFileError),

    #[error("could not determine home directory to locate ~/.aws/credentials")]
    NoHomeDirectory,
}

/// Explicit construction-time arguments, mirroring §4.3 step 1.
#[derive(Debug, Clone, Default)]
pub struct ExplicitCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Inputs to credential resolution besides the process environment, kept
/// explicit (rather than read from global state) so tests are hermetic —
/// the one exception allowed by §9 "Global state" is the credentials file
/// path, which this struct also carries as a construction-time override.
#[derive(Debug, Clone, Default)]
pub struct CredentialResolutionContext {
    pub explicit: ExplicitCredentials,
    /// Override for the shared credentials file path; defaults to
    /// `~/.aws/credentials` when `None`.
    pub credentials_file_path: Option<PathBuf>,
}

/// Resolve credentials per §4.3: explicit, then environment, then the
/// shared credentials file, then anonymous. `env` is injected so tests
/// don't depend on (or fight over) real process environment variables.
pub fn resolve_credential(
    ctx: &CredentialResolutionContext,
    env: &dyn EnvSource,
) -> Result<Credential, CredentialError> {
    if let (Some(key), Some(secret)) = (
        ctx.explicit.access_key_id.as_ref(),
        ctx.explicit.secret_access_key.as_ref(),
    ) {
        debug!(source = "explicit", "resolved AWS credential");
        return Ok(Credential {
            access_key_id: key.clone(),
            secret_access_key: secret.clone(),
            session_token: ctx.explicit.session_token.clone(),
            expiration: None,
        });
    }

    if let (Some(key), Some(secret)) = (
        env.get("AWS_ACCESS_KEY_ID"),
        env.get("AWS_SECRET_ACCESS_KEY"),
    ) {
        debug!(source = "env", "resolved AWS credential");
        return Ok(Credential {
            access_key_id: key,
            secret_access_key: secret,
            session_token: env.get("AWS_SESSION_TOKEN"),
            expiration: None,
        });
    }

    let profile = env.get("AWS_PROFILE").unwrap_or_else(|| "default".to_string());
    let path = match &ctx.credentials_file_path {
        Some(p) => Some(p.clone()),
        None => default_credentials_path(env),
    };
    if let Some(path) = path {
        if let Some(credential) = try_profile(&path, &profile)? {
            debug!(source = %format!("profile:{profile}"), "resolved AWS credential");
            return Ok(credential);
        }
    }

    debug!(source = "anonymous", "resolved AWS credential");
    Ok(Credential::anonymous())
}

fn try_profile(path: &Path, profile: &str) -> Result<Option<Credential>, CredentialError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| {
        CredentialError::File(CredentialsFileError::Io(path.display().to_string(), e))
    })?;
    let profiles = parse_credentials_file(&contents)?;
    Ok(profiles.get(profile).and_then(Profile::to_credential))
}

fn default_credentials_path(env: &dyn EnvSource) -> Option<PathBuf> {
    env.home_dir().map(|home| home.join(".aws").join("credentials"))
}

/// Resolve a region per §4.3's analogous chain: explicit → a
/// `partitionEndpoint` that is itself a valid region name → `AWS_DEFAULT_REGION`
/// → `us-east-1`.
pub fn resolve_region(
    explicit: Option<&str>,
    partition_endpoint: Option<&str>,
    env: &dyn EnvSource,
) -> Region {
    if let Some(r) = explicit.and_then(|s| s.parse().ok()) {
        return r;
    }
    if let Some(r) = partition_endpoint.and_then(|s| s.parse().ok()) {
        return r;
    }
    if let Some(r) = env.get("AWS_DEFAULT_REGION").and_then(|s| s.parse().ok()) {
        return r;
    }
    Region::UsEast1
}

/// Indirection over process environment + home directory lookup so
/// credential/region resolution is testable without mutating real env vars.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
    fn home_dir(&self) -> Option<PathBuf>;
}

/// The real process environment, used by `Client` construction in
/// production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeEnv {
        vars: HashMap<String, String>,
        home: Option<PathBuf>,
    }

    impl EnvSource for FakeEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
        fn home_dir(&self) -> Option<PathBuf> {
            self.home.clone()
        }
    }

    #[test]
    fn explicit_wins_over_everything() {
        let mut env = FakeEnv::default();
        env.vars
            .insert("AWS_ACCESS_KEY_ID".into(), "ENVKEY".into());
        env.vars
            .insert("AWS_SECRET_ACCESS_KEY".into(), "ENVSECRET".into());

        let ctx = CredentialResolutionContext {
            explicit: ExplicitCredentials {
                access_key_id: Some("EXPLICITKEY".into()),
                secret_access_key: Some("EXPLICITSECRET".into()),
                session_token: None,
            },
            credentials_file_path: None,
        };

        let cred = resolve_credential(&ctx, &env).unwrap();
        assert_eq!(cred.access_key_id, "EXPLICITKEY");
    }

    #[test]
    fn env_wins_over_file_and_anonymous() {
        let mut env = FakeEnv::default();
        env.vars
            .insert("AWS_ACCESS_KEY_ID".into(), "ENVKEY".into());
        env.vars
            .insert("AWS_SECRET_ACCESS_KEY".into(), "ENVSECRET".into());

        let cred = resolve_credential(&CredentialResolutionContext::default(), &env).unwrap();
        assert_eq!(cred.access_key_id, "ENVKEY");
        assert_eq!(cred.secret_access_key, "ENVSECRET");
    }

    #[test]
    fn falls_back_to_anonymous() {
        let env = FakeEnv::default();
        let cred = resolve_credential(&CredentialResolutionContext::default(), &env).unwrap();
        assert!(cred.is_anonymous());
    }

    #[test]
    fn file_profile_used_when_no_explicit_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\naws_access_key_id = FILEKEY\naws_secret_access_key = FILESECRET\n",
        )
        .unwrap();

        let env = FakeEnv::default();
        let ctx = CredentialResolutionContext {
            explicit: ExplicitCredentials::default(),
            credentials_file_path: Some(path),
        };
        let cred = resolve_credential(&ctx, &env).unwrap();
        assert_eq!(cred.access_key_id, "FILEKEY");
        assert_eq!(cred.secret_access_key, "FILESECRET");
    }

    #[test]
    fn aws_profile_env_selects_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\naws_access_key_id = DEFAULTKEY\naws_secret_access_key = DEFAULTSECRET\n\
             [work]\naws_access_key_id = WORKKEY\naws_secret_access_key = WORKSECRET\n",
        )
        .unwrap();

        let mut env = FakeEnv::default();
        env.vars.insert("AWS_PROFILE".into(), "work".into());
        let ctx = CredentialResolutionContext {
            explicit: ExplicitCredentials::default(),
            credentials_file_path: Some(path),
        };
        let cred = resolve_credential(&ctx, &env).unwrap();
        assert_eq!(cred.access_key_id, "WORKKEY");
    }

    #[test]
    fn region_resolution_order() {
        let mut env = FakeEnv::default();
        env.vars
            .insert("AWS_DEFAULT_REGION".into(), "eu-west-1".into());
        assert_eq!(resolve_region(None, None, &env), Region::EuWest1);
        assert_eq!(
            resolve_region(Some("ap-south-1"), None, &env),
            Region::ApSouth1
        );
        assert_eq!(resolve_region(None, Some("sa-east-1"), &env), Region::SaEast1);
    }

    #[test]
    fn region_defaults_to_us_east_1() {
        let env = FakeEnv::default();
        assert_eq!(resolve_region(None, None, &env), Region::UsEast1);
    }

    #[test]
    fn credential_debug_never_prints_secret() {
        let cred = Credential {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "supersecret".into(),
            session_token: Some("tok".into()),
            expiration: None,
        };
        let rendered = format!("{cred:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(!rendered.contains("tok"));
    }
}
