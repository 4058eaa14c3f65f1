use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};

use crate::entities::user;
use crate::validation::ValidationErrors;

pub mod api;
pub mod web;

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

/// A registered account, stripped of its credential secret.
#[derive(Debug, PartialEq, Clone, Eq)]
pub struct User {
    id: i32,
    username: String,
}

impl User {
    pub fn new(id: i32, username: String) -> Self {
        Self { id, username }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User::new(model.id, model.username)
    }
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// One or more submitted fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// Password hashing or verification failed internally.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Submitted registration fields, exactly as they arrived. Validation is the
/// service's concern.
#[derive(Debug, Default, Clone)]
pub struct RegisterDraft {
    pub username: Option<String>,
    pub password: Option<String>,
    pub password2: Option<String>,
}

pub struct UserService<'a> {
    db: &'a DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &DatabaseConnection) -> UserService {
        UserService { db }
    }

    /// Registers a new account.
    ///
    /// Both password submissions must match and the username must be unique;
    /// nothing is written unless every check passes. The stored secret is an
    /// argon2 hash, never the password itself.
    #[tracing::instrument(skip(self, draft))]
    pub async fn register(&self, draft: RegisterDraft) -> Result<User, UserServiceError> {
        let mut errors = ValidationErrors::new();

        let username = required_field(&draft.username, "username", &mut errors);
        let password = required_field(&draft.password, "password", &mut errors);
        let password2 = required_field(&draft.password2, "password2", &mut errors);

        if let Some(username) = username {
            if username.chars().count() > MAX_USERNAME_LEN {
                errors.add(
                    "username",
                    format!(
                        "Ensure this field has no more than {} characters.",
                        MAX_USERNAME_LEN
                    ),
                );
            } else if self.find_by_username(username).await?.is_some() {
                errors.add("username", "A user with that username already exists.");
            }
        }

        if let Some(password) = password {
            validate_password(password, &mut errors);
            if let Some(password2) = password2 {
                if password != password2 {
                    errors.add("password", "The two password fields didn't match.");
                }
            }
        }

        if !errors.is_empty() {
            tracing::warn!("user registration failed validation");
            return Err(UserServiceError::Validation(errors));
        }

        let username = draft.username.unwrap_or_default();
        let password_hash = hash_password(&draft.password.unwrap_or_default())
            .map_err(UserServiceError::PasswordHash)?;

        let active_model = user::ActiveModel {
            username: ActiveValue::Set(username),
            password_hash: ActiveValue::Set(password_hash),
            created_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        tracing::info!(user_id = created.id, username = %created.username, "user registered");
        Ok(User::from(created))
    }

    /// Checks a username/password pair against the store.
    ///
    /// Returns `None` for an unknown username and for a wrong password alike;
    /// callers cannot distinguish the two cases.
    #[tracing::instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let Some(model) = self.find_by_username(username).await? else {
            return Ok(None);
        };

        if verify_password(password, &model.password_hash)
            .map_err(UserServiceError::PasswordHash)?
        {
            Ok(Some(User::from(model)))
        } else {
            Ok(None)
        }
    }

    async fn find_by_username(
        &self,
        username: &str,
    ) -> Result<Option<user::Model>, UserServiceError> {
        let model = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .one(self.db)
            .await?;
        Ok(model)
    }
}

/// Returns the trimmed-down view of a required field, recording missing or
/// blank submissions as errors.
fn required_field<'a>(
    value: &'a Option<String>,
    field: &str,
    errors: &mut ValidationErrors,
) -> Option<&'a str> {
    match value.as_deref() {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some("") => {
            errors.add(field, "This field may not be blank.");
            None
        }
        Some(value) => Some(value),
    }
}

fn validate_password(password: &str, errors: &mut ValidationErrors) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!(
                "This password is too short. It must contain at least {} characters.",
                MIN_PASSWORD_LEN
            ),
        );
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add("password", "This password is entirely numeric.");
    }
}

fn hash_password(plain: &str) -> Result<String, String> {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHasher, SaltString, rand_core::OsRng};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| e.to_string())
}

fn verify_password(plain: &str, hash: &str) -> Result<bool, String> {
    use argon2::Argon2;
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    let parsed = PasswordHash::new(hash).map_err(|e| e.to_string())?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
