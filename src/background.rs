//! Background collaborator channel
//!
//! The background service owns persistent storage, configuration, and the
//! usage totals. This module models its asynchronous request/response
//! protocol: tagged requests, typed responses, and the organization-id
//! enrichment applied to every outgoing envelope.

use crate::config::RemoteConfig;
use crate::models::UsageSnapshot;
use crate::page::{HostPage, ORG_COOKIE};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

/// Request tags understood by the background collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BackgroundRequest {
    GetConfig,
    GetCollapsedState,
    SetCollapsedState {
        #[serde(rename = "isCollapsed")]
        is_collapsed: bool,
    },
    GetPreviousVersion,
    SetCurrentVersion {
        version: String,
    },
    RequestData {
        #[serde(rename = "conversationId", skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
    },
    InitOrg,
}

/// An outgoing request enriched with the organization identifier read from
/// the page's `lastActiveOrg` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub request: BackgroundRequest,
    #[serde(rename = "orgId", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

/// Typed responses from the collaborator.
#[derive(Debug, Clone)]
pub enum BackgroundResponse {
    Config(RemoteConfig),
    Collapsed(bool),
    Version(Option<String>),
    Data(UsageSnapshot),
    Ack,
}

/// Transport to the background collaborator. Requests are awaited and assumed
/// to eventually resolve; there is no timeout or retry wrapper around them.
pub trait BackgroundChannel: Send + Sync {
    fn send(&self, envelope: Envelope) -> impl Future<Output = Result<BackgroundResponse>> + Send;
}

/// Typed facade over a [`BackgroundChannel`]: builds envelopes and checks the
/// response variant for each request tag.
pub struct BackgroundClient<B> {
    channel: B,
}

impl<B: BackgroundChannel> BackgroundClient<B> {
    pub fn new(channel: B) -> Self {
        Self { channel }
    }

    async fn send(
        &self,
        page: &dyn HostPage,
        request: BackgroundRequest,
    ) -> Result<BackgroundResponse> {
        let envelope = Envelope {
            org_id: page.cookie(ORG_COOKIE),
            request,
        };
        debug!(request = ?envelope.request, "Sending background request");
        self.channel.send(envelope).await
    }

    pub async fn get_config(&self, page: &dyn HostPage) -> Result<RemoteConfig> {
        match self.send(page, BackgroundRequest::GetConfig).await? {
            BackgroundResponse::Config(config) => Ok(config),
            other => anyhow::bail!("Unexpected response to getConfig: {other:?}"),
        }
    }

    pub async fn get_collapsed_state(&self, page: &dyn HostPage) -> Result<bool> {
        match self.send(page, BackgroundRequest::GetCollapsedState).await? {
            BackgroundResponse::Collapsed(collapsed) => Ok(collapsed),
            other => anyhow::bail!("Unexpected response to getCollapsedState: {other:?}"),
        }
    }

    pub async fn set_collapsed_state(&self, page: &dyn HostPage, is_collapsed: bool) -> Result<()> {
        self.send(page, BackgroundRequest::SetCollapsedState { is_collapsed })
            .await?;
        Ok(())
    }

    pub async fn get_previous_version(&self, page: &dyn HostPage) -> Result<Option<String>> {
        match self.send(page, BackgroundRequest::GetPreviousVersion).await? {
            BackgroundResponse::Version(version) => Ok(version),
            other => anyhow::bail!("Unexpected response to getPreviousVersion: {other:?}"),
        }
    }

    pub async fn set_current_version(&self, page: &dyn HostPage, version: &str) -> Result<()> {
        self.send(
            page,
            BackgroundRequest::SetCurrentVersion {
                version: version.to_string(),
            },
        )
        .await?;
        Ok(())
    }

    pub async fn request_data(
        &self,
        page: &dyn HostPage,
        conversation_id: Option<String>,
    ) -> Result<UsageSnapshot> {
        match self
            .send(page, BackgroundRequest::RequestData { conversation_id })
            .await?
        {
            BackgroundResponse::Data(snapshot) => Ok(snapshot),
            other => anyhow::bail!("Unexpected response to requestData: {other:?}"),
        }
    }

    /// Fire-and-forget semantically: the ack is awaited but carries nothing.
    pub async fn init_org(&self, page: &dyn HostPage) -> Result<()> {
        self.send(page, BackgroundRequest::InitOrg).await?;
        Ok(())
    }
}
