use crate::error::CoreError;
use crate::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileLink {
    pub username: String,
    pub profile_url: Option<String>,
    pub exists: bool,
}

/// Public profile link for a registered user, if one exists.
pub async fn profile_url(state: &AppState, username: &str) -> Result<ProfileLink, CoreError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(CoreError::validation("Username is required"));
    }
    let user = parley_db::users::get_user_by_username(&state.db, username).await?;
    let profile_url = user.as_ref().map(|u| {
        format!(
            "{}/u/{}",
            state.config.public_url.trim_end_matches('/'),
            u.username
        )
    });
    Ok(ProfileLink {
        username: username.to_string(),
        exists: profile_url.is_some(),
        profile_url,
    })
}
