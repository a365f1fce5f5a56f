// Copyright 2024 Oxide Computer Company

//! Users, their roles, and the identity attached to an authorized request

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha1::Digest;
use sha1::Sha1;
use std::collections::BTreeSet;
use std::fmt;
use subtle::ConstantTimeEq;

/// An authenticated user, as produced by an `AuthenticationProvider`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct User {
    /// unique login name
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub mail: String,
    /// token for persistent re-authentication, created on demand
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
}

impl User {
    pub fn new(name: &str) -> Self {
        User {
            name: name.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            mail: String::new(),
            token: None,
        }
    }

    pub fn with_full_name(mut self, first_name: &str, last_name: &str) -> Self {
        self.first_name = first_name.to_string();
        self.last_name = last_name.to_string();
        self
    }

    pub fn with_mail(mut self, mail: &str) -> Self {
        self.mail = mail.to_string();
        self
    }

    /// Returns this user's token, deriving one with `salt` the first time.
    pub fn ensure_token(&mut self, salt: &str) -> &Token {
        let token = match self.token.take() {
            Some(token) => token,
            None => Token::generate(self, salt),
        };
        self.token.insert(token)
    }
}

/// An opaque token a user can present later in place of credentials.
///
/// The value is a SHA-1 digest over a salt, the user's fields, and a random
/// UUID, so two tokens for the same user never collide.
#[derive(Clone, Deserialize, PartialEq, Eq, Serialize)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
}

impl Token {
    pub fn generate(user: &User, salt: &str) -> Self {
        let mut hasher = Sha1::new();
        for part in [
            salt,
            &user.name,
            &user.first_name,
            &user.last_name,
            &user.mail,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        Token {
            value: URL_SAFE_NO_PAD.encode(hasher.finalize()),
            issued_at: Utc::now(),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Compares `candidate` against this token without stopping at the first
    /// differing byte.
    pub fn matches(&self, candidate: &str) -> bool {
        let expected = self.value.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() {
            return false;
        }
        expected.ct_eq(candidate).into()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// An immutable set of role names.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Roles(BTreeSet<String>);

impl Roles {
    /// The empty set of roles.
    pub fn none() -> Self {
        Roles(BTreeSet::new())
    }

    pub fn of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Roles(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<'a> IntoIterator for &'a Roles {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The user and roles of an authorized request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    user: User,
    roles: Roles,
}

impl Identity {
    pub fn new(user: User, roles: Roles) -> Self {
        Identity { user, roles }
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn roles(&self) -> &Roles {
        &self.roles
    }
}

#[cfg(test)]
mod test {
    use super::Roles;
    use super::Token;
    use super::User;

    #[test]
    fn test_roles() {
        let roles = Roles::of(["user", "admin", "user"]);
        assert_eq!(roles.len(), 2);
        assert!(roles.contains("admin"));
        assert!(!roles.contains("root"));
        assert_eq!(roles.iter().collect::<Vec<_>>(), vec!["admin", "user"]);
        assert!(Roles::none().is_empty());
        assert_eq!(Roles::none(), Roles::of(Vec::<String>::new()));
    }

    #[test]
    fn test_roles_serialize_as_list() {
        let roles = Roles::of(["b", "a"]);
        assert_eq!(serde_json::to_string(&roles).unwrap(), r#"["a","b"]"#);
        let back: Roles = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(back, roles);
    }

    #[test]
    fn test_token_created_once() {
        let mut user = User::new("mikey")
            .with_full_name("Mike", "Y")
            .with_mail("mikey@example.com");
        assert!(user.token.is_none());
        let first = user.ensure_token("pepper").clone();
        let second = user.ensure_token("pepper").clone();
        assert_eq!(first, second);
        assert!(first.matches(first.value()));
        assert!(!first.matches("not-the-token"));
    }

    #[test]
    fn test_token_matches() {
        let token = Token::generate(&User::new("mikey"), "salt");
        let value = token.value().to_string();
        assert!(token.matches(&value));

        // Same length, one byte different.
        let mut altered = value.clone().into_bytes();
        altered[26] = if altered[26] == b'A' { b'B' } else { b'A' };
        let altered = String::from_utf8(altered).unwrap();
        assert!(!token.matches(&altered));

        assert!(!token.matches(&value[..26]));
        assert!(!token.matches(&format!("{}A", value)));
        assert!(!token.matches(""));
    }

    #[test]
    fn test_tokens_are_unique() {
        let user = User::new("mikey");
        let a = Token::generate(&user, "salt");
        let b = Token::generate(&user, "salt");
        assert_ne!(a.value(), b.value());
        // 20 bytes of SHA-1, base64url without padding
        assert_eq!(a.value().len(), 27);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let user = User::new("mikey");
        let token = Token::generate(&user, "salt");
        let debug = format!("{:?}", token);
        assert!(!debug.contains(token.value()));
        assert!(debug.contains("redacted"));
    }
}
