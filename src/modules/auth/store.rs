use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::modules::tokens::TokenSubject;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),
    #[error("no account with id {0}")]
    NotFound(String),
    #[error("failed to access user file: {0}")]
    Io(#[from] io::Error),
    #[error("user file is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("user store lock poisoned")]
    Poisoned,
}

/// Account record. `password` holds the encoded hash and is the state
/// fingerprint for issued tokens.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: &str, password_hash: String, joined: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.trim().to_string(),
            first_name: String::new(),
            last_name: String::new(),
            password: password_hash,
            is_active: true,
            is_verified: false,
            date_joined: joined,
            last_login: None,
        }
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

impl TokenSubject for User {
    fn subject_id(&self) -> &str {
        &self.id
    }

    fn state_fingerprint(&self) -> &str {
        &self.password
    }

    fn last_login(&self) -> Option<DateTime<Utc>> {
        self.last_login
    }
}

/// Account persistence used by the account flows
pub trait UserStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn insert(&self, user: User) -> Result<(), StoreError>;
    fn update(&self, user: &User) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<User>, StoreError>;
}

fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

fn insert_into(users: &mut HashMap<String, User>, user: User) -> Result<(), StoreError> {
    let key = email_key(&user.email);
    if users.values().any(|u| email_key(&u.email) == key) {
        return Err(StoreError::DuplicateEmail(user.email));
    }
    users.insert(user.id.clone(), user);
    Ok(())
}

fn update_in(users: &mut HashMap<String, User>, user: &User) -> Result<(), StoreError> {
    let key = email_key(&user.email);
    if users
        .values()
        .any(|u| u.id != user.id && email_key(&u.email) == key)
    {
        return Err(StoreError::DuplicateEmail(user.email.clone()));
    }
    match users.get_mut(&user.id) {
        Some(existing) => {
            *existing = user.clone();
            Ok(())
        }
        None => Err(StoreError::NotFound(user.id.clone())),
    }
}

fn find_in(users: &HashMap<String, User>, email: &str) -> Option<User> {
    let key = email_key(email);
    users.values().find(|u| email_key(&u.email) == key).cloned()
}

fn sorted(users: &HashMap<String, User>) -> Vec<User> {
    users
        .values()
        .sorted_by(|a, b| email_key(&a.email).cmp(&email_key(&b.email)))
        .cloned()
        .collect()
}

/// In-memory store
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for MemoryUserStore {
    fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(users.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(find_in(&users, email))
    }

    fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::Poisoned)?;
        insert_into(&mut users, user)
    }

    fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::Poisoned)?;
        update_in(&mut users, user)
    }

    fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(sorted(&users))
    }
}

/// Store backed by a JSON file, rewritten after every mutation
pub struct JsonUserStore {
    path: PathBuf,
    users: RwLock<HashMap<String, User>>,
}

impl JsonUserStore {
    /// Load the file at `path`; a missing file yields an empty store
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let users = match fs::read_to_string(&path) {
            Ok(data) if data.trim().is_empty() => HashMap::new(),
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, users: &HashMap<String, User>) -> Result<(), StoreError> {
        let data = serde_json::to_string_pretty(users)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl UserStore for JsonUserStore {
    fn get(&self, id: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(users.get(id).cloned())
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(find_in(&users, email))
    }

    fn insert(&self, user: User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::Poisoned)?;
        insert_into(&mut users, user)?;
        self.save(&users)
    }

    fn update(&self, user: &User) -> Result<(), StoreError> {
        let mut users = self.users.write().map_err(|_| StoreError::Poisoned)?;
        update_in(&mut users, user)?;
        self.save(&users)
    }

    fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = self.users.read().map_err(|_| StoreError::Poisoned)?;
        Ok(sorted(&users))
    }
}
