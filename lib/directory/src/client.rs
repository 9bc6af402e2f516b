//! Identity-provider admin REST client.
//!
//! Every call is authenticated with an admin token obtained through the
//! client-credentials grant. Reads fail with `DirectoryUnavailable` on a
//! non-success status and are never retried here.

use crate::error::DirectoryError;
use crate::model::{DirectoryEntry, DirectoryGroup, NewAccount, UserQuery};
use crate::token::AdminTokenProvider;
use keygate_core::{ClientUuid, DirectoryUserId, GroupId};
use keygate_identity::KeycloakConfig;
use reqwest::header::LOCATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use rootcause::prelude::Report;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

/// Extra condition applied by [`DirectoryClient::filter_by_group`].
pub type EntryPredicate<'a> = &'a (dyn Fn(&DirectoryEntry) -> bool + Send + Sync);

#[derive(Deserialize)]
struct ClientRepresentation {
    id: ClientUuid,
}

/// Admin directory client for one realm.
pub struct DirectoryClient {
    http: reqwest::Client,
    admin_base: Url,
    tokens: AdminTokenProvider,
    client_id: String,
    user_role: String,
    approval_group: String,
    email_domain: Option<String>,
}

impl DirectoryClient {
    /// Creates a client for the configured realm.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` if the admin or token URL is unusable, or
    /// `NetworkFailure` if the HTTP client cannot be constructed.
    pub fn new(config: &KeycloakConfig) -> Result<Self, Report<DirectoryError>> {
        let admin_base = config.admin_base();
        let admin_url = Url::parse(&admin_base)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| DirectoryError::InvalidEndpoint { url: admin_base })?;

        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(DirectoryError::from)?;

        let tokens = AdminTokenProvider::new(
            &config.token_endpoint(),
            config.client_id(),
            SecretString::from(config.client_secret().expose_secret().to_string()),
        )?;

        Ok(Self {
            http,
            admin_base: admin_url,
            tokens,
            client_id: config.client_id().to_string(),
            user_role: config.user_role().to_string(),
            approval_group: config.approval_group().to_string(),
            email_domain: config.email_domain().map(str::to_string),
        })
    }

    /// Lists users matching `query`.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` on a non-success response.
    #[instrument(skip(self))]
    pub async fn list_users(
        &self,
        query: &UserQuery,
    ) -> Result<Vec<DirectoryEntry>, Report<DirectoryError>> {
        let request = self.request(Method::GET, &["users"]).await?.query(query);
        let users: Vec<DirectoryEntry> = self.read_json(request).await?;
        debug!(count = users.len(), "users listed");
        Ok(users)
    }

    /// Fetches one user.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the user does not exist, `DirectoryUnavailable`
    /// on any other non-success response.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn get_user(
        &self,
        id: &DirectoryUserId,
    ) -> Result<DirectoryEntry, Report<DirectoryError>> {
        let request = self.request(Method::GET, &["users", id.as_str()]).await?;
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound {
                resource: "user",
                id: id.to_string(),
            }
            .into());
        }
        decode(response).await
    }

    /// Lists the groups a user belongs to.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` on a non-success response.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_groups(
        &self,
        user_id: &DirectoryUserId,
    ) -> Result<Vec<DirectoryGroup>, Report<DirectoryError>> {
        let request = self
            .request(Method::GET, &["users", user_id.as_str(), "groups"])
            .await?;
        self.read_json(request).await
    }

    /// Returns the usernames of `users` that are in `group` and satisfy
    /// `predicate`.
    ///
    /// Looks groups up one user at a time. A failed lookup excludes that user
    /// and is logged; it does not fail the batch.
    pub async fn filter_by_group(
        &self,
        users: &[DirectoryEntry],
        group: &str,
        predicate: Option<EntryPredicate<'_>>,
    ) -> Vec<String> {
        self.members_of(users, group, predicate)
            .await
            .into_iter()
            .map(|entry| entry.username)
            .collect()
    }

    /// Disabled accounts in the approval group.
    ///
    /// Returned entries carry their group names.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` if the user listing fails.
    #[instrument(skip(self), fields(group = %self.approval_group))]
    pub async fn pending_approvals(&self) -> Result<Vec<DirectoryEntry>, Report<DirectoryError>> {
        let candidates = self.list_users(&UserQuery::disabled()).await?;
        let not_enabled = |entry: &DirectoryEntry| !entry.enabled;
        let pending = self
            .members_of(&candidates, &self.approval_group, Some(&not_enabled))
            .await;
        info!(candidates = candidates.len(), pending = pending.len(), "pending approvals");
        Ok(pending)
    }

    /// Enables a previously disabled account.
    ///
    /// Sends the full record back with `enabled` set. `user` is not modified;
    /// the updated record is returned on success.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalFailed` on a non-success response, in which case the
    /// account is unchanged.
    #[instrument(skip(self, user), fields(user_id = %user.id, username = %user.username))]
    pub async fn approve_user(
        &self,
        user: &DirectoryEntry,
    ) -> Result<DirectoryEntry, Report<DirectoryError>> {
        let mut approved = user.clone();
        approved.enabled = true;

        let request = self
            .request(Method::PUT, &["users", user.id.as_str()])
            .await?
            .json(&approved);
        let response = self.send(request).await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            warn!(%status, "approval rejected");
            return Err(DirectoryError::ApprovalFailed {
                status: status.as_u16(),
                details,
            }
            .into());
        }

        info!("account approved");
        Ok(approved)
    }

    /// Creates an account and grants it a client role.
    ///
    /// If any step after creation fails the new account is deleted again.
    /// A failing delete is logged; the reported error is always the step
    /// that failed.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationFailed` naming the failed step.
    #[instrument(skip_all, fields(username = %account.phone_number))]
    pub async fn register_user(
        &self,
        account: &NewAccount,
    ) -> Result<DirectoryUserId, Report<DirectoryError>> {
        let id = self.create_user(account).await?;

        if let Err(report) = self.complete_registration(&id, account).await {
            warn!(user_id = %id, error = %report, "registration incomplete; removing account");
            if let Err(e) = self.delete_user(&id).await {
                error!(user_id = %id, error = %e, "failed to remove partially registered account");
            }
            return Err(report);
        }

        info!(user_id = %id, "account registered");
        Ok(id)
    }

    /// Deletes an account.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryUnavailable` on a non-success response.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn delete_user(&self, id: &DirectoryUserId) -> Result<(), Report<DirectoryError>> {
        let request = self.request(Method::DELETE, &["users", id.as_str()]).await?;
        let response = self.send(request).await?;
        check_status(response).await?;
        Ok(())
    }

    async fn members_of(
        &self,
        users: &[DirectoryEntry],
        group: &str,
        predicate: Option<EntryPredicate<'_>>,
    ) -> Vec<DirectoryEntry> {
        let mut members = Vec::new();
        for user in users {
            if predicate.is_some_and(|accept| !accept(user)) {
                continue;
            }
            let groups = match self.list_groups(&user.id).await {
                Ok(groups) => groups,
                Err(e) => {
                    warn!(user_id = %user.id, error = %e, "group lookup failed; excluding user");
                    continue;
                }
            };
            if groups.iter().any(|g| g.name == group) {
                let mut member = user.clone();
                member.groups = groups.into_iter().map(|g| g.name).collect();
                members.push(member);
            }
        }
        members
    }

    async fn create_user(
        &self,
        account: &NewAccount,
    ) -> Result<DirectoryUserId, Report<DirectoryError>> {
        const STEP: &str = "create user";

        let request = self
            .request(Method::POST, &["users"])
            .await?
            .json(&account.representation(self.email_domain.as_deref()));
        let response = self.send(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(registration_failure(STEP, response).await.into());
        }

        let from_location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.rsplit('/').next())
            .and_then(|id| id.parse::<DirectoryUserId>().ok());
        if let Some(id) = from_location {
            debug!(user_id = %id, "account created");
            return Ok(id);
        }

        // No usable Location header; look the account up by username instead.
        let found = self
            .list_users(&UserQuery::username(&account.phone_number))
            .await
            .map_err(|e| DirectoryError::RegistrationFailed {
                step: STEP,
                status: None,
                details: format!("created account could not be located: {e}"),
            })?;
        found
            .into_iter()
            .find(|entry| entry.username == account.phone_number)
            .map(|entry| entry.id)
            .ok_or_else(|| {
                DirectoryError::RegistrationFailed {
                    step: STEP,
                    status: None,
                    details: "created account could not be located".to_string(),
                }
                .into()
            })
    }

    async fn complete_registration(
        &self,
        id: &DirectoryUserId,
        account: &NewAccount,
    ) -> Result<(), Report<DirectoryError>> {
        let role = account.client_role.as_deref().unwrap_or(&self.user_role);
        self.assign_client_role(id, role).await?;
        if let Some(group) = &account.group {
            self.join_group(id, group).await?;
        }
        Ok(())
    }

    async fn assign_client_role(
        &self,
        id: &DirectoryUserId,
        role: &str,
    ) -> Result<(), Report<DirectoryError>> {
        const STEP: &str = "assign client role";

        let request = self
            .request(Method::GET, &["clients"])
            .await?
            .query(&[("clientId", self.client_id.as_str())]);
        let clients: Vec<ClientRepresentation> = self.registration_json(STEP, request).await?;
        let client = clients
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::RegistrationFailed {
                step: STEP,
                status: None,
                details: format!("client {} not found", self.client_id),
            })?;

        let request = self
            .request(
                Method::GET,
                &["clients", client.id.as_str(), "roles", role],
            )
            .await?;
        let representation: Value = self.registration_json(STEP, request).await?;

        let request = self
            .request(
                Method::POST,
                &[
                    "users",
                    id.as_str(),
                    "role-mappings",
                    "clients",
                    client.id.as_str(),
                ],
            )
            .await?
            .json(&[representation]);
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(registration_failure(STEP, response).await.into());
        }

        debug!(user_id = %id, role, "client role assigned");
        Ok(())
    }

    async fn join_group(&self, id: &DirectoryUserId, group: &str) -> Result<(), Report<DirectoryError>> {
        const STEP: &str = "join group";

        let request = self
            .request(Method::GET, &["groups"])
            .await?
            .query(&[("search", group)]);
        let groups: Vec<DirectoryGroup> = self.registration_json(STEP, request).await?;
        let group_id: GroupId = groups
            .into_iter()
            .find(|g| g.name == group)
            .map(|g| g.id)
            .ok_or_else(|| DirectoryError::RegistrationFailed {
                step: STEP,
                status: None,
                details: format!("group {group} not found"),
            })?;

        let request = self
            .request(
                Method::PUT,
                &["users", id.as_str(), "groups", group_id.as_str()],
            )
            .await?;
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(registration_failure(STEP, response).await.into());
        }

        debug!(user_id = %id, group, "group joined");
        Ok(())
    }

    /// Builds an authenticated request for `admin_base/segments...`.
    async fn request(
        &self,
        method: Method,
        segments: &[&str],
    ) -> Result<RequestBuilder, Report<DirectoryError>> {
        let mut url = self.admin_base.clone();
        url.path_segments_mut()
            .map_err(|()| DirectoryError::InvalidEndpoint {
                url: self.admin_base.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);

        let token = self.tokens.token(&self.http).await?;
        Ok(self
            .http
            .request(method, url)
            .bearer_auth(token.expose_secret()))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, Report<DirectoryError>> {
        let response = request.send().await.map_err(DirectoryError::from)?;
        if response.status() == StatusCode::UNAUTHORIZED {
            // Revoked or rotated; fetch a new one next time.
            self.tokens.invalidate().await;
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, Report<DirectoryError>> {
        let response = self.send(request).await?;
        decode(response).await
    }

    async fn registration_json<T: DeserializeOwned>(
        &self,
        step: &'static str,
        request: RequestBuilder,
    ) -> Result<T, Report<DirectoryError>> {
        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(registration_failure(step, response).await.into());
        }
        let status = response.status().as_u16();
        response.json().await.map_err(|e| {
            DirectoryError::RegistrationFailed {
                step,
                status: Some(status),
                details: format!("invalid response body: {e}"),
            }
            .into()
        })
    }
}

async fn check_status(response: Response) -> Result<Response, Report<DirectoryError>> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let details = response.text().await.unwrap_or_default();
    Err(DirectoryError::DirectoryUnavailable {
        status: status.as_u16(),
        details,
    }
    .into())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, Report<DirectoryError>> {
    let response = check_status(response).await?;
    let status = response.status().as_u16();
    response.json().await.map_err(|e| {
        DirectoryError::DirectoryUnavailable {
            status,
            details: format!("invalid response body: {e}"),
        }
        .into()
    })
}

async fn registration_failure(step: &'static str, response: Response) -> DirectoryError {
    let status = response.status().as_u16();
    let details = response.text().await.unwrap_or_default();
    DirectoryError::RegistrationFailed {
        step,
        status: Some(status),
        details,
    }
}
