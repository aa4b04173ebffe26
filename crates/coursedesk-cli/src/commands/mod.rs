pub mod gradebook;
pub mod init;
pub mod questions;
pub mod report;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use coursedesk_core::model::Teacher;
use coursedesk_core::session::Session;
use coursedesk_providers::{create_provider, load_config_from, CoursedeskConfig};

/// Load config, build the provider and log in as the configured teacher.
pub(crate) async fn connect_as_teacher(
    config_path: Option<PathBuf>,
) -> Result<(CoursedeskConfig, Session, Teacher)> {
    let config = load_config_from(config_path.as_deref())?;
    let provider = create_provider(&config.backend)?;
    let session = Session::new(Arc::clone(&provider));

    let (Some(username), Some(password)) = (&config.auth.username, &config.auth.password) else {
        anyhow::bail!(
            "no credentials configured: set [auth] in coursedesk.toml or \
             COURSEDESK_USERNAME / COURSEDESK_PASSWORD"
        );
    };
    session
        .login(username, password)
        .await
        .with_context(|| format!("login as {username} failed"))?;
    let teacher = session.require_teacher().await?;

    Ok((config, session, teacher))
}
