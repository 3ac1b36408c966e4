use tracing::{debug, info};

use super::{AuthnError, UserManager};
use crate::storage::models::{Provider, User};
use crate::sync::SyncJob;

impl UserManager {
    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a new user with an empty credential map
    pub fn add_user(&self, id: &str, secret: &str) -> Result<(), AuthnError> {
        if id.is_empty() || secret.is_empty() {
            return Err(AuthnError::InvalidCredentials);
        }

        // Token lock first: nobody can log in between registration and the
        // removal of a token left over from an earlier user with this id
        let mut tokens = self.tokens.lock();
        {
            let mut users = self.users.lock();
            if users.contains_key(id) {
                return Err(AuthnError::AlreadyExists(id.to_string()));
            }
            users.insert(id.to_string(), User::new(id, secret));
            self.version.bump();
            if let Err(e) = self.save_users(&users) {
                users.remove(id);
                return Err(e.into());
            }
        }
        let revoked = self.revoke_owner(&mut tokens, id);
        drop(tokens);
        info!(user = %id, "Registered user");

        if revoked {
            self.schedule(SyncJob::Tokens);
        }
        self.schedule(SyncJob::Credentials);
        Ok(())
    }

    /// Remove a user and revoke its token
    pub fn delete_user(&self, id: &str) -> Result<(), AuthnError> {
        let mut tokens = self.tokens.lock();
        {
            let mut users = self.users.lock();
            let removed = users
                .remove(id)
                .ok_or_else(|| AuthnError::user_not_found(id))?;
            self.version.bump();
            if let Err(e) = self.save_users(&users) {
                users.insert(id.to_string(), removed);
                return Err(e.into());
            }
        }
        let revoked = self.revoke_owner(&mut tokens, id);
        drop(tokens);
        info!(user = %id, "Deleted user");

        if revoked {
            self.schedule(SyncJob::Tokens);
        }
        self.schedule(SyncJob::Credentials);
        Ok(())
    }

    /// Check a user's secret, returning the user on an exact match
    pub fn authenticate(&self, id: &str, secret: &str) -> Result<User, AuthnError> {
        let users = self.users.lock();
        match users.get(id) {
            Some(user) if user.secret_matches(secret) => Ok(user.clone()),
            _ => {
                debug!(user = %id, "Authentication failed");
                Err(AuthnError::InvalidCredentials)
            }
        }
    }

    /// All registered users, ordered by id
    pub fn users(&self) -> Vec<User> {
        self.users.lock().values().cloned().collect()
    }

    // ========================================================================
    // Provider credentials
    // ========================================================================

    /// Set a user's credential for `provider`, returning whether it changed
    pub fn update_credential(
        &self,
        id: &str,
        provider: &str,
        value: &str,
    ) -> Result<bool, AuthnError> {
        let provider: Provider = provider.parse()?;

        let mut users = self.users.lock();
        let user = users
            .get_mut(id)
            .ok_or_else(|| AuthnError::user_not_found(id))?;

        let previous = user.creds.get(&provider).cloned();
        if previous.as_deref().unwrap_or_default() == value {
            return Ok(false);
        }
        if previous.is_some() {
            debug!(user = %id, %provider, "Replacing user credentials");
        }
        user.creds.insert(provider, value.to_string());
        self.version.bump();

        if let Err(e) = self.save_users(&users) {
            if let Some(user) = users.get_mut(id) {
                match previous {
                    Some(old) => user.creds.insert(provider, old),
                    None => user.creds.remove(&provider),
                };
            }
            return Err(e.into());
        }
        drop(users);

        info!(user = %id, %provider, "Updated user credentials");
        self.schedule(SyncJob::Credentials);
        Ok(true)
    }

    /// Remove a user's credential for `provider`; `false` if none was stored
    pub fn delete_credential(&self, id: &str, provider: &str) -> Result<bool, AuthnError> {
        let provider: Provider = provider.parse()?;

        let mut users = self.users.lock();
        let user = users
            .get_mut(id)
            .ok_or_else(|| AuthnError::user_not_found(id))?;

        let Some(old) = user.creds.remove(&provider) else {
            info!(user = %id, %provider, "User has no credentials for provider, skipping");
            return Ok(false);
        };
        self.version.bump();

        if let Err(e) = self.save_users(&users) {
            if let Some(user) = users.get_mut(id) {
                user.creds.insert(provider, old);
            }
            return Err(e.into());
        }
        drop(users);

        info!(user = %id, %provider, "Removed user credentials");
        self.schedule(SyncJob::Credentials);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{drain_jobs, test_manager};
    use std::sync::Arc;

    #[test]
    fn test_add_then_authenticate() {
        let (manager, _queue, _temp) = test_manager();

        manager.add_user("alice", "s3cret").unwrap();
        let user = manager.authenticate("alice", "s3cret").unwrap();
        assert_eq!(user.id, "alice");
        assert!(user.creds.is_empty());
    }

    #[test]
    fn test_add_rejects_empty_fields() {
        let (manager, _queue, _temp) = test_manager();

        assert!(matches!(
            manager.add_user("", "pw"),
            Err(AuthnError::InvalidCredentials)
        ));
        assert!(matches!(
            manager.add_user("alice", ""),
            Err(AuthnError::InvalidCredentials)
        ));
        assert_eq!(manager.version(), 1);
    }

    #[test]
    fn test_duplicate_add_keeps_version() {
        let (manager, _queue, _temp) = test_manager();

        manager.add_user("alice", "s3cret").unwrap();
        let version = manager.version();

        assert!(matches!(
            manager.add_user("alice", "other"),
            Err(AuthnError::AlreadyExists(_))
        ));
        assert_eq!(manager.version(), version);
        assert!(manager.authenticate("alice", "s3cret").is_ok());
    }

    #[test]
    fn test_authenticate_failures() {
        let (manager, _queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();

        assert!(matches!(
            manager.authenticate("alice", "wrong"),
            Err(AuthnError::InvalidCredentials)
        ));
        assert!(matches!(
            manager.authenticate("bob", "s3cret"),
            Err(AuthnError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_delete_user() {
        let (manager, mut queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();
        let signed = manager.issue_token("alice", "s3cret").unwrap();
        drain_jobs(&mut queue);
        let version = manager.version();

        manager.delete_user("alice").unwrap();

        assert_eq!(manager.version(), version + 1);
        assert!(manager.authenticate("alice", "s3cret").is_err());
        assert!(matches!(
            manager.validate(&signed),
            Err(AuthnError::NotFound(_))
        ));
        let jobs = drain_jobs(&mut queue);
        assert!(jobs.contains(&SyncJob::Tokens));
        assert!(jobs.contains(&SyncJob::Credentials));
    }

    #[test]
    fn test_delete_unknown_user() {
        let (manager, _queue, _temp) = test_manager();
        assert!(matches!(
            manager.delete_user("ghost"),
            Err(AuthnError::NotFound(_))
        ));
        assert_eq!(manager.version(), 1);
    }

    #[test]
    fn test_reregistration_drops_stale_token() {
        let (manager, _queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();
        let signed = manager.issue_token("alice", "s3cret").unwrap();

        // Simulate a leftover token: remove the user without going through delete_user
        manager.users.lock().remove("alice");
        manager.add_user("alice", "n3w").unwrap();

        assert!(matches!(
            manager.validate(&signed),
            Err(AuthnError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_credential() {
        let (manager, mut queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();
        drain_jobs(&mut queue);
        let version = manager.version();

        assert!(manager.update_credential("alice", "aws", "AKIA1").unwrap());
        assert_eq!(manager.version(), version + 1);
        assert_eq!(drain_jobs(&mut queue), vec![SyncJob::Credentials]);

        // Same value again is not a change
        assert!(!manager.update_credential("alice", "aws", "AKIA1").unwrap());
        assert_eq!(manager.version(), version + 1);
        assert!(drain_jobs(&mut queue).is_empty());

        assert!(manager.update_credential("alice", "aws", "AKIA2").unwrap());
        assert_eq!(manager.version(), version + 2);

        let user = manager.authenticate("alice", "s3cret").unwrap();
        assert_eq!(user.creds.get(&Provider::Aws).map(String::as_str), Some("AKIA2"));
    }

    #[test]
    fn test_update_credential_errors() {
        let (manager, _queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();

        assert!(matches!(
            manager.update_credential("alice", "dropbox", "x"),
            Err(AuthnError::InvalidProvider(_))
        ));
        assert!(matches!(
            manager.update_credential("bob", "aws", "x"),
            Err(AuthnError::NotFound(_))
        ));
        // Provider is checked before the user
        assert!(matches!(
            manager.update_credential("bob", "dropbox", "x"),
            Err(AuthnError::InvalidProvider(_))
        ));
    }

    #[test]
    fn test_delete_credential() {
        let (manager, _queue, _temp) = test_manager();
        manager.add_user("alice", "s3cret").unwrap();

        let version = manager.version();
        assert!(!manager.delete_credential("alice", "gcp").unwrap());
        assert_eq!(manager.version(), version);

        manager.update_credential("alice", "gcp", "key").unwrap();
        let version = manager.version();
        assert!(manager.delete_credential("alice", "gcp").unwrap());
        assert_eq!(manager.version(), version + 1);
        assert!(manager
            .authenticate("alice", "s3cret")
            .unwrap()
            .creds
            .is_empty());

        assert!(matches!(
            manager.delete_credential("alice", "ftp"),
            Err(AuthnError::InvalidProvider(_))
        ));
        assert!(matches!(
            manager.delete_credential("bob", "gcp"),
            Err(AuthnError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_add_delete_distinct_ids() {
        let (manager, _queue, _temp) = test_manager();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for i in 0..20 {
                        let id = format!("user-{t}-{i}");
                        manager.add_user(&id, "pw").unwrap();
                        if i % 2 == 0 {
                            manager.delete_user(&id).unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ids: Vec<String> = manager.users().into_iter().map(|u| u.id).collect();
        assert_eq!(ids.len(), 8 * 10);
        assert!(ids.iter().all(|id| {
            let i: usize = id.rsplit('-').next().unwrap().parse().unwrap();
            i % 2 == 1
        }));
        // One bump per add and per delete
        assert_eq!(manager.version(), 1 + 8 * 20 + 8 * 10);
    }

    #[test]
    fn test_login_racing_registration_keeps_token() {
        let (manager, _queue, _temp) = test_manager();
        let manager = Arc::new(manager);

        for round in 0..50 {
            let login = {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || loop {
                    match manager.issue_token("alice", "s3cret") {
                        Ok(signed) => return signed,
                        Err(AuthnError::InvalidCredentials) => std::thread::yield_now(),
                        Err(e) => panic!("unexpected error: {e}"),
                    }
                })
            };
            manager.add_user("alice", "s3cret").unwrap();
            let signed = login.join().unwrap();

            assert_eq!(
                manager.validate(&signed).unwrap().id,
                "alice",
                "token issued in round {round} was revoked"
            );
            manager.delete_user("alice").unwrap();
        }
    }

    #[test]
    fn test_concurrent_add_issue_delete_same_ids() {
        let (manager, _queue, _temp) = test_manager();
        let manager = Arc::new(manager);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("shared-{}", (t + i) % 4);
                        let _ = manager.add_user(&id, "pw");
                        if let Ok(signed) = manager.issue_token(&id, "pw") {
                            let _ = manager.validate(&signed);
                        }
                        let _ = manager.update_credential(&id, "aws", &format!("k{t}"));
                        if i % 3 == 0 {
                            let _ = manager.delete_user(&id);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every surviving token belongs to a registered user
        let ids: Vec<String> = manager.users().into_iter().map(|u| u.id).collect();
        let owners: Vec<String> = manager
            .tokens
            .lock()
            .values()
            .map(|t| t.owner.clone())
            .collect();
        assert!(owners.iter().all(|owner| ids.contains(owner)));
    }
}
