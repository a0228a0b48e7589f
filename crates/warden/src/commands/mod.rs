//! CLI command handlers.

pub mod login;
pub mod logout;
pub mod register;
pub mod roles;
pub mod whoami;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use console::{Style, style};
use reqwest::cookie::Jar;
use warden_auth::{
    Capabilities, Identity, OAuthConfig, PkceEngine, Role, RoleMapping, SessionManager,
    SessionStore,
};
use warden_client::PortalClient;
use warden_config::{RolesConfig, WardenConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration (files, environment, flags).
    pub config: WardenConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Backend client configured from the context.
    pub fn client(&self) -> Result<PortalClient> {
        let base_url = self.config.backend_url()?;
        let client = PortalClient::builder()
            .base_url(base_url.as_str())
            .timeout(self.config.timeout())
            .user_agent(format!("warden/{}", env!("CARGO_PKG_VERSION")))
            .cookie_jar(Arc::new(Jar::default()))
            .build()?;
        Ok(client)
    }

    /// PKCE engine, if the identity provider is configured.
    pub fn pkce(&self) -> Option<PkceEngine> {
        let idp = self.config.identity_provider().ok()?;
        let config = OAuthConfig::new(idp.base_url, idp.realm, idp.client_id, idp.redirect_uri)
            .with_scope(idp.scope);
        Some(PkceEngine::in_memory(config))
    }

    /// Session manager backed by the durable session file.
    pub fn session(&self) -> Result<SessionManager> {
        let data_dir = self.config.data_dir()?;
        let mut session = SessionManager::new(self.client()?, SessionStore::file(&data_dir))
            .with_role_mapping(role_mapping(&self.config.roles())?);
        if let Some(path) = self.config.exchange_path() {
            session = session.with_exchange_path(path);
        }
        if let Some(pkce) = self.pkce() {
            session = session.with_pkce(pkce);
        }
        Ok(session)
    }

    /// Restore the stored session or fail with a hint to sign in.
    pub async fn signed_in(&self) -> Result<SessionManager> {
        let session = self.session()?;
        match session.restore().await {
            Ok(Some(_)) => Ok(session),
            Ok(None) => Err(anyhow!("Not signed in. Run 'warden login' first.")),
            Err(e) => Err(anyhow!(
                "{}. Run 'warden login' to sign in again.",
                e.user_message()
            )),
        }
    }
}

/// Turn the `[roles]` table into a claim mapping.
pub fn role_mapping(roles: &RolesConfig) -> Result<RoleMapping> {
    let mut mapping = RoleMapping::default();
    if let Some(prefixes) = &roles.strip_prefixes {
        mapping.strip_prefixes = prefixes.clone();
    }
    for (claim, role) in &roles.aliases {
        let role = role
            .parse::<Role>()
            .map_err(|e: String| anyhow!(e))
            .with_context(|| format!("invalid alias for claim '{}' in [roles]", claim))?;
        mapping.aliases.insert(claim.clone(), role);
    }
    Ok(mapping)
}

/// Names of the capabilities that are granted.
pub fn granted(capabilities: &Capabilities) -> Result<Vec<String>> {
    let value = serde_json::to_value(capabilities)?;
    let granted = value
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(_, v)| v.as_bool() == Some(true))
                .map(|(k, _)| k.clone())
                .collect()
        })
        .unwrap_or_default();
    Ok(granted)
}

/// Print the identity block shared by `login` and `whoami`.
pub fn print_identity(identity: &Identity, show_capabilities: bool) -> Result<()> {
    let dim = Style::new().dim();
    let green = Style::new().green();

    println!();
    println!("  {} {}", dim.apply_to("User:"), style(&identity.username).bold());
    println!("  {} {}", dim.apply_to("Email:"), identity.email);
    println!("  {} {}", dim.apply_to("Role:"), green.apply_to(identity.role));

    if show_capabilities {
        let granted = granted(&identity.capabilities())?;
        println!();
        println!("  {}", dim.apply_to("Capabilities:"));
        if granted.is_empty() {
            println!("    {}", dim.apply_to("(none)"));
        }
        for name in granted {
            println!("    {} {}", green.apply_to("✓"), name);
        }
    }
    println!();
    Ok(())
}

/// Read one line from stdin after showing `label`.
pub fn prompt_line(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Try to open a URL in the default browser.
pub fn open_url(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).status()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).status()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .status()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_role_mapping_from_config() {
        let roles = RolesConfig {
            strip_prefixes: Some(vec!["portal:".to_string()]),
            aliases: BTreeMap::from([("lead".to_string(), "manager".to_string())]),
        };
        let mapping = role_mapping(&roles).unwrap();
        assert_eq!(mapping.derive_role(&["portal:analyst"]), Role::Analyst);
        assert_eq!(mapping.derive_role(&["lead"]), Role::Manager);
    }

    #[test]
    fn test_role_mapping_rejects_unknown_role() {
        let roles = RolesConfig {
            strip_prefixes: None,
            aliases: BTreeMap::from([("lead".to_string(), "overlord".to_string())]),
        };
        let err = role_mapping(&roles).unwrap_err();
        assert!(format!("{:#}", err).contains("lead"));
    }

    #[test]
    fn test_granted_lists_true_flags() {
        let granted = granted(&Capabilities::for_role(Role::Admin)).unwrap();
        assert_eq!(granted, vec!["can_review_role_requests".to_string()]);
    }
}
