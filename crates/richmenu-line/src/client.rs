use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use richmenu_core::config::{LineConfig, MAX_RUN_MESSAGE_CHARS};
use richmenu_core::truncate::truncate_chars;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::descriptor::RichMenuDescriptor;
use crate::error::{LineError, Result};

/// A rich menu as returned by `GET /v2/bot/richmenu/list`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMenu {
    pub rich_menu_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct MenuList {
    #[serde(default)]
    richmenus: Vec<RemoteMenu>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedMenu {
    rich_menu_id: String,
}

/// External calls made while publishing a job.
///
/// Every call takes the channel access token of the account that owns the
/// job; implementations hold no per-account state.
#[async_trait]
pub trait PublishClient: Send + Sync {
    async fn list_menus(&self, token: &str) -> Result<Vec<RemoteMenu>>;

    async fn delete_menu(&self, token: &str, rich_menu_id: &str) -> Result<()>;

    /// Create a menu object and return its LINE-assigned id.
    async fn create_menu(&self, token: &str, descriptor: &RichMenuDescriptor) -> Result<String>;

    async fn upload_content(
        &self,
        token: &str,
        rich_menu_id: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()>;

    async fn update_alias(&self, token: &str, alias_id: &str, rich_menu_id: &str) -> Result<()>;

    async fn create_alias(&self, token: &str, alias_id: &str, rich_menu_id: &str) -> Result<()>;

    /// Make `rich_menu_id` the default menu for every user of the channel.
    async fn set_default(&self, token: &str, rich_menu_id: &str) -> Result<()>;

    async fn link_user(&self, token: &str, user_id: &str, rich_menu_id: &str) -> Result<()>;
}

/// reqwest-backed [`PublishClient`] talking to the LINE Messaging API.
pub struct LineClient {
    client: reqwest::Client,
    api_base: Url,
    api_data_base: Url,
    upload_timeout: Duration,
}

impl LineClient {
    pub fn new(config: &LineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: parse_base(&config.api_base)?,
            api_data_base: parse_base(&config.api_data_base)?,
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        endpoint(&self.api_base, segments)
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| LineError::InvalidBaseUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(LineError::InvalidBaseUrl(raw.to_string()));
    }
    Ok(url)
}

/// Append `segments` to `base`, percent-encoding each one.
///
/// Alias and user ids come from the editor and may contain `/`, `?` or
/// spaces; each must stay a single path segment.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Turn a non-2xx response into `LineError::Rejected`.
async fn check(resp: reqwest::Response, call: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();
    warn!(call, status, body = %text, "LINE API error");
    Err(LineError::Rejected {
        status,
        body: truncate_chars(&text, MAX_RUN_MESSAGE_CHARS),
    })
}

#[async_trait]
impl PublishClient for LineClient {
    async fn list_menus(&self, token: &str) -> Result<Vec<RemoteMenu>> {
        let resp = self
            .client
            .get(self.url(&["v2", "bot", "richmenu", "list"]))
            .bearer_auth(token)
            .send()
            .await?;
        let list: MenuList = check(resp, "list_menus").await?.json().await?;
        Ok(list.richmenus)
    }

    async fn delete_menu(&self, token: &str, rich_menu_id: &str) -> Result<()> {
        debug!(rich_menu_id, "deleting rich menu");
        let resp = self
            .client
            .delete(self.url(&["v2", "bot", "richmenu", rich_menu_id]))
            .bearer_auth(token)
            .send()
            .await?;
        check(resp, "delete_menu").await?;
        Ok(())
    }

    async fn create_menu(&self, token: &str, descriptor: &RichMenuDescriptor) -> Result<String> {
        debug!(name = %descriptor.name, areas = descriptor.areas.len(), "creating rich menu");
        let resp = self
            .client
            .post(self.url(&["v2", "bot", "richmenu"]))
            .bearer_auth(token)
            .json(descriptor)
            .send()
            .await?;
        let created: CreatedMenu = check(resp, "create_menu").await?.json().await?;
        Ok(created.rich_menu_id)
    }

    async fn upload_content(
        &self,
        token: &str,
        rich_menu_id: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<()> {
        debug!(rich_menu_id, bytes = bytes.len(), "uploading rich menu image");
        let url = endpoint(
            &self.api_data_base,
            &["v2", "bot", "richmenu", rich_menu_id, "content"],
        );
        let resp = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("content-type", content_type)
            .timeout(self.upload_timeout)
            .body(bytes)
            .send()
            .await?;
        check(resp, "upload_content").await?;
        Ok(())
    }

    async fn update_alias(&self, token: &str, alias_id: &str, rich_menu_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&["v2", "bot", "richmenu", "alias", alias_id]))
            .bearer_auth(token)
            .json(&json!({ "richMenuId": rich_menu_id }))
            .send()
            .await?;
        check(resp, "update_alias").await?;
        Ok(())
    }

    async fn create_alias(&self, token: &str, alias_id: &str, rich_menu_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&["v2", "bot", "richmenu", "alias"]))
            .bearer_auth(token)
            .json(&json!({ "richMenuAliasId": alias_id, "richMenuId": rich_menu_id }))
            .send()
            .await?;
        check(resp, "create_alias").await?;
        Ok(())
    }

    async fn set_default(&self, token: &str, rich_menu_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&["v2", "bot", "user", "all", "richmenu", rich_menu_id]))
            .bearer_auth(token)
            .send()
            .await?;
        check(resp, "set_default").await?;
        Ok(())
    }

    async fn link_user(&self, token: &str, user_id: &str, rich_menu_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&["v2", "bot", "user", user_id, "richmenu", rich_menu_id]))
            .bearer_auth(token)
            .send()
            .await?;
        check(resp, "link_user").await?;
        Ok(())
    }
}
