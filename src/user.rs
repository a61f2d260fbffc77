use serde::{Deserialize, Serialize};

use crate::{
    credentials,
    error::{Error, Result},
    record_store::{Collection, RecordStore},
};

/// A wiki account. Only the derived key and its salt are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password: Vec<u8>,
    pub salt: Vec<u8>,
    #[serde(default)]
    pub admin: bool,
}

impl User {
    /// Build a user with `password` already derived.
    pub fn new(username: &str, password: &str, admin: bool) -> Result<Self> {
        validate_username(username)?;
        let mut user = Self {
            username: username.to_string(),
            password: Vec::new(),
            salt: Vec::new(),
            admin,
        };
        user.set_password(password)?;
        Ok(user)
    }

    /// Replace the stored key with one derived under a fresh salt.
    pub fn set_password(&mut self, password: &str) -> Result<()> {
        let derived = credentials::derive(password)?;
        self.password = derived.key;
        self.salt = derived.salt;
        Ok(())
    }

    pub fn verify_password(&self, password: &str) -> Result<bool> {
        credentials::verify(password, &self.salt, &self.password)
    }
}

fn validate_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::Validation("username must not be empty".to_string()));
    }
    if username.chars().any(char::is_control) {
        return Err(Error::Validation(
            "username must not contain control characters".to_string(),
        ));
    }
    Ok(())
}

/// Typed access to the user collection.
impl RecordStore {
    /// Store a new user. Fails with `Conflict` if the name is taken.
    pub fn create_user(&self, user: &User) -> Result<()> {
        validate_username(&user.username)?;
        let bytes = serde_json::to_vec(user)?;
        self.insert_new(Collection::Users, &user.username, &bytes)
    }

    /// Overwrite an existing user. Fails with `NotFound` if absent.
    pub fn update_user(&self, user: &User) -> Result<()> {
        let bytes = serde_json::to_vec(user)?;
        self.replace_existing(Collection::Users, &user.username, &bytes)
    }

    pub fn delete_user(&self, username: &str) -> Result<bool> {
        self.delete(Collection::Users, username)
    }

    pub fn get_user(&self, username: &str) -> Result<Option<User>> {
        self.get_json(Collection::Users, username)
    }

    pub fn user_exists(&self, username: &str) -> Result<bool> {
        self.exists(Collection::Users, username)
    }

    pub fn count_users(&self) -> Result<usize> {
        self.count(Collection::Users)
    }

    /// All users, ordered by username.
    pub fn list_users(&self) -> Result<Vec<User>> {
        self.entries(Collection::Users)?
            .into_iter()
            .map(|(_, bytes)| Ok(serde_json::from_slice(&bytes)?))
            .collect()
    }

    /// Look up `username` and check `password`. Returns the user only when
    /// both match; an unknown name and a wrong password look the same.
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let Some(user) = self.get_user(username)? else {
            tracing::debug!(username, "login for unknown user");
            return Ok(None);
        };
        if user.verify_password(password)? {
            Ok(Some(user))
        } else {
            tracing::debug!(username, "login with wrong password");
            Ok(None)
        }
    }

    /// Create an admin account if there are no users at all.
    ///
    /// Returns whether an account was created.
    pub fn ensure_default_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        if self.count_users()? > 0 {
            return Ok(false);
        }
        let admin = User::new(username, password, true)?;
        match self.create_user(&admin) {
            Ok(()) => {
                tracing::info!(username, "created default admin user");
                Ok(true)
            }
            // Someone else bootstrapped first.
            Err(err) if err.is_conflict() => Ok(false),
            Err(err) => Err(err),
        }
    }
}
