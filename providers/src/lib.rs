//! Built-in provider definitions for unisocial.
//!
//! Each module carries one provider's endpoint constants, a
//! [`ProviderProfile`](unisocial::ProviderProfile) with its field aliases and
//! pagination shape, and a config struct that loads the application
//! credentials from `UNISOCIAL_{NAME}_CLIENT_ID` /
//! `UNISOCIAL_{NAME}_CLIENT_SECRET` and builds a ready
//! [`Connection`](unisocial::Connection).

pub mod facebook;
pub mod google;
pub mod soundcloud;
pub mod twitter;

use unisocial::ProviderProfile;

/// All built-in provider profiles.
pub fn profiles() -> Vec<ProviderProfile> {
    vec![
        twitter::profile(),
        facebook::profile(),
        google::profile(),
        soundcloud::profile(),
    ]
}

/// Built-in profile by provider name.
pub fn profile_for(name: &str) -> Option<ProviderProfile> {
    profiles().into_iter().find(|profile| profile.name == name)
}

/// Application client pair from `UNISOCIAL_{NAME}_CLIENT_ID` /
/// `UNISOCIAL_{NAME}_CLIENT_SECRET`.
pub(crate) fn client_pair_from_env(provider: &str) -> anyhow::Result<(String, String)> {
    use anyhow::Context;

    let upper = provider.to_uppercase();
    let id_var = format!("UNISOCIAL_{upper}_CLIENT_ID");
    let secret_var = format!("UNISOCIAL_{upper}_CLIENT_SECRET");
    let client_id = std::env::var(&id_var).with_context(|| format!("{id_var} not set"))?;
    let client_secret =
        std::env::var(&secret_var).with_context(|| format!("{secret_var} not set"))?;
    Ok((client_id, client_secret))
}
