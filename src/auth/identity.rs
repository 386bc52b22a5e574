//! Profile lookup for the signed-in user

use serde::Deserialize;
use thiserror::Error;

use super::helpers::build_profile_url;
use super::session::SessionUser;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Profile request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Profile endpoint returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Profile has no email address")]
    MissingEmail,
}

/// Subset of the Graph `/me` response the portal uses
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphProfile {
    display_name: Option<String>,
    user_principal_name: Option<String>,
    mail: Option<String>,
}

impl GraphProfile {
    fn into_session_user(self) -> Result<SessionUser, IdentityError> {
        let email = self
            .user_principal_name
            .filter(|e| !e.trim().is_empty())
            .or(self.mail.filter(|e| !e.trim().is_empty()))
            .ok_or(IdentityError::MissingEmail)?;

        Ok(SessionUser {
            name: self.display_name.unwrap_or_default(),
            email,
        })
    }
}

/// Fetch the user's name and email with a delegated access token
pub async fn fetch_profile(
    http: &reqwest::Client,
    graph_api_url: &str,
    access_token: &str,
) -> Result<SessionUser, IdentityError> {
    let response = http
        .get(build_profile_url(graph_api_url))
        .bearer_auth(access_token)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(IdentityError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let profile: GraphProfile = response.json().await?;
    profile.into_session_user()
}
