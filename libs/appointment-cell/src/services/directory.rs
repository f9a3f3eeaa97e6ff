use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, ClientRecord, UserRecord};

/// Read-only lookups of clients and staff users.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_client(&self, client_id: Uuid, auth_token: &str) -> Result<Option<ClientRecord>, AppointmentError>;

    async fn get_user(&self, user_id: Uuid, auth_token: &str) -> Result<Option<UserRecord>, AppointmentError>;
}

pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn first_row<T>(&self, path: &str, auth_token: &str) -> Result<Option<T>, AppointmentError>
    where
        T: serde::de::DeserializeOwned,
    {
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse directory row: {}", e)))
    }
}

#[async_trait]
impl Directory for SupabaseDirectory {
    async fn get_client(&self, client_id: Uuid, auth_token: &str) -> Result<Option<ClientRecord>, AppointmentError> {
        let path = format!(
            "/rest/v1/clients?id=eq.{}&select=id,name,email,assigned_health_counselor",
            client_id
        );
        self.first_row(&path, auth_token).await
    }

    async fn get_user(&self, user_id: Uuid, auth_token: &str) -> Result<Option<UserRecord>, AppointmentError> {
        let path = format!("/rest/v1/users?id=eq.{}&select=id,name,email,role", user_id);
        self.first_row(&path, auth_token).await
    }
}

/// Directory held in memory; used by tests and local seeding.
#[derive(Default)]
pub struct InMemoryDirectory {
    clients: RwLock<HashMap<Uuid, ClientRecord>>,
    users: RwLock<HashMap<Uuid, UserRecord>>,
    unavailable: RwLock<bool>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_client(&self, client: ClientRecord) {
        self.clients.write().await.insert(client.id, client);
    }

    pub async fn add_user(&self, user: UserRecord) {
        self.users.write().await.insert(user.id, user);
    }

    /// Makes every lookup fail, as a directory outage would.
    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    async fn check_available(&self) -> Result<(), AppointmentError> {
        if *self.unavailable.read().await {
            return Err(AppointmentError::DatabaseError("directory unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_client(&self, client_id: Uuid, _auth_token: &str) -> Result<Option<ClientRecord>, AppointmentError> {
        self.check_available().await?;
        Ok(self.clients.read().await.get(&client_id).cloned())
    }

    async fn get_user(&self, user_id: Uuid, _auth_token: &str) -> Result<Option<UserRecord>, AppointmentError> {
        self.check_available().await?;
        Ok(self.users.read().await.get(&user_id).cloned())
    }
}
