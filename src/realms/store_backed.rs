//! Managed realms persisted in the store. These are the only realm backends
//! the administrative endpoints can write to.

use super::{check_bcrypt_password, ClientRealm, RealmError, UserRealm, SUB};
use crate::models::{ClientData, PasswordHash, UserData};
use crate::store::{client_key, user_key, Store, StoreBackend};
use std::collections::{BTreeSet, HashMap};

#[derive(Clone)]
pub struct StoreBackedClientRealm {
    realm_name: String,
    store: Store,
}

impl StoreBackedClientRealm {
    pub fn new(realm_name: String, store: Store) -> Self {
        Self { realm_name, store }
    }

    pub async fn create_or_replace(
        &self,
        client_id: &str,
        client: &ClientData,
    ) -> Result<(), RealmError> {
        self.store
            .set(&client_key(&self.realm_name, client_id), client)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, client_id: &str) -> Result<(), RealmError> {
        self.assert_exists(client_id).await?;
        self.store
            .delete(&client_key(&self.realm_name, client_id))
            .await?;
        Ok(())
    }

    async fn assert_exists(&self, client_id: &str) -> Result<ClientData, RealmError> {
        self.get(client_id).await?.ok_or_else(|| {
            RealmError::NotFound(format!(
                "Could not find client {client_id} in realm {}",
                self.realm_name
            ))
        })
    }
}

#[async_trait::async_trait]
impl ClientRealm for StoreBackedClientRealm {
    fn name(&self) -> &str {
        &self.realm_name
    }

    async fn authenticate(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<(), RealmError> {
        let client = self.get(client_id).await?.ok_or_else(|| {
            RealmError::ClientAuthenticationFailed {
                client_id: client_id.to_string(),
                realm: self.realm_name.clone(),
                reason: "client not found",
            }
        })?;

        // Non-confidential clients carry no secret worth checking.
        if client.confidential && !check_bcrypt_password(client_secret, &client.secret_hash) {
            return Err(RealmError::ClientAuthenticationFailed {
                client_id: client_id.to_string(),
                realm: self.realm_name.clone(),
                reason: "wrong client secret",
            });
        }

        let missing: BTreeSet<String> = scopes
            .iter()
            .filter(|scope| !default_scopes.contains(*scope))
            .filter(|scope| !client.scopes.contains(*scope))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RealmError::ClientScopeInvalid {
                client_id: client_id.to_string(),
                realm: self.realm_name.clone(),
                missing,
            });
        }

        Ok(())
    }

    async fn get(&self, client_id: &str) -> Result<Option<ClientData>, RealmError> {
        Ok(self
            .store
            .get(&client_key(&self.realm_name, client_id))
            .await?)
    }
}

#[derive(Clone)]
pub struct StoreBackedUserRealm {
    realm_name: String,
    store: Store,
}

impl StoreBackedUserRealm {
    pub fn new(realm_name: String, store: Store) -> Self {
        Self { realm_name, store }
    }

    pub async fn get(&self, username: &str) -> Result<Option<UserData>, RealmError> {
        Ok(self
            .store
            .get(&user_key(&self.realm_name, username))
            .await?)
    }

    pub async fn create_or_replace(
        &self,
        username: &str,
        user: &UserData,
    ) -> Result<(), RealmError> {
        self.store
            .set(&user_key(&self.realm_name, username), user)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, username: &str) -> Result<(), RealmError> {
        self.assert_exists(username).await?;
        self.store
            .delete(&user_key(&self.realm_name, username))
            .await?;
        Ok(())
    }

    /// Append one more valid password hash without touching the others.
    pub async fn add_password(
        &self,
        username: &str,
        password: PasswordHash,
    ) -> Result<(), RealmError> {
        let mut user = self.assert_exists(username).await?;
        user.password_hashes.push(password);
        self.create_or_replace(username, &user).await
    }

    async fn assert_exists(&self, username: &str) -> Result<UserData, RealmError> {
        self.get(username).await?.ok_or_else(|| {
            RealmError::NotFound(format!(
                "Could not find user {username} in realm {}",
                self.realm_name
            ))
        })
    }
}

#[async_trait::async_trait]
impl UserRealm for StoreBackedUserRealm {
    fn name(&self) -> &str {
        &self.realm_name
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
        scopes: &BTreeSet<String>,
        default_scopes: &BTreeSet<String>,
    ) -> Result<HashMap<String, String>, RealmError> {
        let user = self.get(username).await?.ok_or_else(|| {
            RealmError::UserAuthenticationFailed {
                username: username.to_string(),
                realm: self.realm_name.clone(),
            }
        })?;

        // Any one of the stored hashes may match, so password rotation can
        // keep the previous password valid for a grace period.
        if !user
            .password_hashes
            .iter()
            .any(|entry| check_bcrypt_password(password, &entry.hash))
        {
            return Err(RealmError::UserAuthenticationFailed {
                username: username.to_string(),
                realm: self.realm_name.clone(),
            });
        }

        let missing: BTreeSet<String> = scopes
            .iter()
            .filter(|scope| !default_scopes.contains(*scope))
            .filter(|scope| !user.scopes.contains_key(*scope))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RealmError::UserScopeInvalid {
                username: username.to_string(),
                realm: self.realm_name.clone(),
                missing,
            });
        }

        Ok(HashMap::from([(SUB.to_string(), username.to_string())]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopes::split;
    use crate::store::memory::MemoryStore;

    fn realm_pair() -> (StoreBackedClientRealm, StoreBackedUserRealm) {
        let store = Store::Memory(MemoryStore::new());
        (
            StoreBackedClientRealm::new("/services".to_string(), store.clone()),
            StoreBackedUserRealm::new("/services".to_string(), store),
        )
    }

    fn test_client(confidential: bool) -> ClientData {
        ClientData::default()
            .with_secret_hash(bcrypt::hash("app-secret", 4).unwrap())
            .with_scopes(split("uid team.read"))
            .confidential(confidential)
    }

    fn test_user() -> UserData {
        UserData {
            password_hashes: vec![PasswordHash {
                hash: bcrypt::hash("user-pass", 4).unwrap(),
                created: 0,
                created_by: "test".to_string(),
            }],
            scopes: HashMap::from([("uid".to_string(), "true".to_string())]),
            ..UserData::default()
        }
    }

    #[tokio::test]
    async fn confidential_client_requires_matching_secret() {
        let (clients, _) = realm_pair();
        clients
            .create_or_replace("testapp", &test_client(true))
            .await
            .unwrap();

        let empty = BTreeSet::new();
        assert!(clients
            .authenticate("testapp", "app-secret", &empty, &empty)
            .await
            .is_ok());

        let err = clients
            .authenticate("testapp", "wrong", &empty, &empty)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealmError::ClientAuthenticationFailed {
                reason: "wrong client secret",
                ..
            }
        ));

        let err = clients
            .authenticate("unknown", "app-secret", &empty, &empty)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RealmError::ClientAuthenticationFailed {
                reason: "client not found",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn public_client_skips_secret_check() {
        let (clients, _) = realm_pair();
        clients
            .create_or_replace("webapp", &test_client(false))
            .await
            .unwrap();

        let empty = BTreeSet::new();
        assert!(clients
            .authenticate("webapp", "", &empty, &empty)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn client_scope_check_enumerates_missing_scopes() {
        let (clients, _) = realm_pair();
        clients
            .create_or_replace("testapp", &test_client(true))
            .await
            .unwrap();

        let defaults = split("uid");
        let err = clients
            .authenticate(
                "testapp",
                "app-secret",
                &split("uid team.read write.all admin"),
                &defaults,
            )
            .await
            .unwrap_err();
        match err {
            RealmError::ClientScopeInvalid { missing, .. } => {
                assert_eq!(missing, split("write.all admin"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn user_authentication_accepts_any_stored_hash() {
        let (_, users) = realm_pair();
        users.create_or_replace("alice", &test_user()).await.unwrap();
        users
            .add_password(
                "alice",
                PasswordHash {
                    hash: bcrypt::hash("rotated-pass", 4).unwrap(),
                    created: 1,
                    created_by: "test".to_string(),
                },
            )
            .await
            .unwrap();

        let empty = BTreeSet::new();
        let claims = users
            .authenticate("alice", "user-pass", &empty, &empty)
            .await
            .unwrap();
        assert_eq!(claims.get(SUB).map(String::as_str), Some("alice"));

        assert!(users
            .authenticate("alice", "rotated-pass", &empty, &empty)
            .await
            .is_ok());
        assert!(users
            .authenticate("alice", "stale-pass", &empty, &empty)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn user_scopes_beyond_defaults_must_be_owned() {
        let (_, users) = realm_pair();
        users.create_or_replace("alice", &test_user()).await.unwrap();

        let defaults = split("openid");
        assert!(users
            .authenticate("alice", "user-pass", &split("uid openid"), &defaults)
            .await
            .is_ok());

        let err = users
            .authenticate("alice", "user-pass", &split("uid admin"), &defaults)
            .await
            .unwrap_err();
        match err {
            RealmError::UserScopeInvalid { missing, .. } => assert_eq!(missing, split("admin")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_missing_entity_reports_not_found() {
        let (clients, users) = realm_pair();
        assert!(matches!(
            clients.delete("ghost").await,
            Err(RealmError::NotFound(_))
        ));
        assert!(matches!(
            users.delete("ghost").await,
            Err(RealmError::NotFound(_))
        ));
    }
}
