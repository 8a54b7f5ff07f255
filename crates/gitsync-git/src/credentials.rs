//! Credential callbacks for network operations
//!
//! libgit2 asks for credentials through a callback and keeps asking while
//! the remote rejects them. The callbacks built here answer from the
//! configured [`AuthConfig`] and give up after [`MAX_CREDENTIAL_ATTEMPTS`],
//! which surfaces as an authentication error instead of a hang.

use git2::{Cred, CredentialType, ErrorClass, ErrorCode, RemoteCallbacks};
use gitsync_core::config::{expand_home, AuthConfig};
use tracing::debug;

/// How many times one operation may answer a credential request
pub const MAX_CREDENTIAL_ATTEMPTS: u32 = 3;

/// Builds remote callbacks that answer credential requests from `auth`
pub fn remote_callbacks(auth: &AuthConfig) -> RemoteCallbacks<'_> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0u32;

    callbacks.credentials(move |url, username_from_url, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Callback,
                format!("credentials for {url} were rejected {MAX_CREDENTIAL_ATTEMPTS} times"),
            ));
        }
        debug!(url, ?allowed, attempt = attempts, "Remote requested credentials");
        credential_for(auth, url, username_from_url, allowed)
    });

    callbacks
}

fn credential_for(
    auth: &AuthConfig,
    url: &str,
    username_from_url: Option<&str>,
    allowed: CredentialType,
) -> Result<Cred, git2::Error> {
    match auth {
        AuthConfig::UsernameToken { username, .. } if allowed.is_user_pass_plaintext() => {
            let token = auth.resolved_token().ok_or_else(|| {
                git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "username_token auth configured without a token",
                )
            })?;
            Cred::userpass_plaintext(username, &token)
        }
        AuthConfig::SshKey {
            username,
            private_key,
            public_key,
            passphrase,
        } if allowed.is_ssh_key() => {
            let public_key = public_key.as_deref().map(expand_home);
            Cred::ssh_key(
                username_from_url.unwrap_or(username),
                public_key.as_deref(),
                &expand_home(private_key),
                passphrase.as_deref(),
            )
        }
        _ => fallback_credential(url, username_from_url.or(auth.username()), allowed),
    }
}

/// ssh-agent for ssh remotes, the git credential helper for http remotes
fn fallback_credential(
    url: &str,
    username: Option<&str>,
    allowed: CredentialType,
) -> Result<Cred, git2::Error> {
    if allowed.is_ssh_key() {
        return Cred::ssh_key_from_agent(username.unwrap_or("git"));
    }
    if allowed.is_user_pass_plaintext() {
        let config = git2::Config::open_default()?;
        return Cred::credential_helper(&config, url, username);
    }
    if allowed.is_username() {
        return Cred::username(username.unwrap_or("git"));
    }
    Cred::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_auth_without_token_fails() {
        std::env::remove_var(gitsync_core::config::TOKEN_ENV);
        let auth = AuthConfig::UsernameToken {
            username: "alice".into(),
            token: None,
        };
        let err = credential_for(
            &auth,
            "https://example.com/repo.git",
            None,
            CredentialType::USER_PASS_PLAINTEXT,
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::Auth);
    }

    #[test]
    fn test_token_auth_answers_plaintext() {
        let auth = AuthConfig::UsernameToken {
            username: "alice".into(),
            token: Some("secret".into()),
        };
        let cred = credential_for(
            &auth,
            "https://example.com/repo.git",
            None,
            CredentialType::USER_PASS_PLAINTEXT,
        )
        .unwrap();
        assert!(cred.has_username());
    }
}
