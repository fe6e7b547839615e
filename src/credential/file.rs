//! INI-style parser for the shared credentials file (`~/.aws/credentials`).
//!
//! Comments start with `;` or `#` (full-line or trailing), keys/values are
//! trimmed, and `[profile]` headers are matched case-sensitively and
//! verbatim.

use std::collections::HashMap;

use thiserror::Error;

use crate::credential::Credential;

#[derive(Debug, Error)]
pub enum CredentialsFileError {
    #[error("error reading {0}: {1}")]
    Io(String, #[source] std::io::Error),
}

/// One `[profile]` section's recognized keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
}

impl Profile {
    pub fn to_credential(&self) -> Option<Credential> {
        let access_key_id = self.aws_access_key_id.clone()?;
        let secret_access_key = self.aws_secret_access_key.clone()?;
        Some(Credential {
            access_key_id,
            secret_access_key,
            session_token: self.aws_session_token.clone(),
            expiration: None,
        })
    }
}

/// Parse `contents` as a credentials INI file into a `profile name ->
/// Profile` map. Never fails on malformed lines — unrecognized keys and
/// lines with no `=` are silently skipped, matching "accepts any
/// INI-compatible input" from the source notes.
pub fn parse_credentials_file(
    contents: &str,
) -> Result<HashMap<String, Profile>, CredentialsFileError> {
    let mut profiles: HashMap<String, Profile> = HashMap::new();
    let mut current: Option<String> = None;

    for raw_line in contents.lines() {
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            let name = line[1..line.len() - 1].trim().to_string();
            profiles.entry(name.clone()).or_default();
            current = Some(name);
            continue;
        }

        let Some(section) = current.as_ref() else {
            continue;
        };
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().to_string();
        let profile = profiles.entry(section.clone()).or_default();
        match key {
            "aws_access_key_id" => profile.aws_access_key_id = Some(value),
            "aws_secret_access_key" => profile.aws_secret_access_key = Some(value),
            "aws_session_token" => profile.aws_session_token = Some(value),
            _ => {}
        }
    }

    Ok(profiles)
}

/// Strip a `;` or `#` comment. AWS credential values never legitimately
/// contain those characters, so a naive "first occurrence not inside
/// quotes" rule is sufficient here.
fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ';' | '#' if !in_quotes => return &line[..idx],
            _ => {}
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_default_profile() {
        let profiles = parse_credentials_file(
            "[default]\naws_access_key_id = AKID\naws_secret_access_key = SECRET\n",
        )
        .unwrap();
        let default = profiles.get("default").unwrap();
        assert_eq!(default.aws_access_key_id.as_deref(), Some("AKID"));
        assert_eq!(default.aws_secret_access_key.as_deref(), Some("SECRET"));
    }

    #[test]
    fn strips_semicolon_and_hash_comments() {
        let profiles = parse_credentials_file(
            "; a comment line\n[default]\naws_access_key_id = AKID # trailing comment\naws_secret_access_key = SECRET ; also trailing\n",
        )
        .unwrap();
        let default = profiles.get("default").unwrap();
        assert_eq!(default.aws_access_key_id.as_deref(), Some("AKID"));
        assert_eq!(default.aws_secret_access_key.as_deref(), Some("SECRET"));
    }

    #[test]
    fn multiple_profiles_are_independent() {
        let profiles = parse_credentials_file(
            "[default]\naws_access_key_id = DEFAULTKEY\naws_secret_access_key = DEFAULTSECRET\n\
             [work]\naws_access_key_id = WORKKEY\naws_secret_access_key = WORKSECRET\naws_session_token = TOK\n",
        )
        .unwrap();
        assert_eq!(
            profiles.get("default").unwrap().aws_access_key_id.as_deref(),
            Some("DEFAULTKEY")
        );
        assert_eq!(
            profiles.get("work").unwrap().aws_session_token.as_deref(),
            Some("TOK")
        );
    }

    #[test]
    fn profile_headers_are_case_sensitive() {
        let profiles = parse_credentials_file(
            "[Default]\naws_access_key_id = AKID\naws_secret_access_key = SECRET\n",
        )
        .unwrap();
        assert!(profiles.get("default").is_none());
        assert!(profiles.get("Default").is_some());
    }

    #[test]
    fn unrecognized_keys_and_malformed_lines_are_ignored() {
        let profiles = parse_credentials_file(
            "[default]\nnot_a_key_value_line\nregion = us-east-1\naws_access_key_id = AKID\naws_secret_access_key = SECRET\n",
        )
        .unwrap();
        let default = profiles.get("default").unwrap();
        assert_eq!(default.aws_access_key_id.as_deref(), Some("AKID"));
    }

    #[test]
    fn incomplete_profile_has_no_credential() {
        let profiles =
            parse_credentials_file("[default]\naws_access_key_id = AKID\n").unwrap();
        let default = profiles.get("default").unwrap();
        assert!(default.to_credential().is_none());
    }

    proptest::proptest! {
        /// No input string ever makes the parser fail or panic; malformed
        /// lines are simply skipped, per "accepts any INI-compatible input".
        #[test]
        fn parser_never_fails_on_arbitrary_text(contents in ".{0,500}") {
            proptest::prop_assert!(parse_credentials_file(&contents).is_ok());
        }

        /// A well-formed single profile round-trips its two required keys
        /// regardless of how much incidental whitespace or trailing comment
        /// surrounds each line.
        #[test]
        fn well_formed_profile_round_trips_keys(
            key in "[A-Za-z0-9_/+=]{1,40}",
            secret in "[A-Za-z0-9_/+=]{1,40}",
            pad in " {0,4}",
            comment in proptest::option::of("[;#][a-z ]{0,10}"),
        ) {
            let trailer = comment.unwrap_or_default();
            let contents = format!(
                "[default]\naws_access_key_id ={pad}{key}{pad}{trailer}\naws_secret_access_key ={pad}{secret}{pad}{trailer}\n"
            );
            let profiles = parse_credentials_file(&contents).unwrap();
            let default = profiles.get("default").unwrap();
            proptest::prop_assert_eq!(default.aws_access_key_id.as_deref(), Some(key.as_str()));
            proptest::prop_assert_eq!(default.aws_secret_access_key.as_deref(), Some(secret.as_str()));
        }
    }
}
