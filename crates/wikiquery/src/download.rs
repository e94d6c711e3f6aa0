//! Executes compiled requests against the wiki API.
//!
//! One POST per request, no retries. A [`Downloader`] keeps a cookie store,
//! so reusing it across requests keeps an API session alive.

use std::time::Duration;

use reqwest::multipart::{Form, Part};

use crate::config::{DownloaderConfig, WikiInfo};
use crate::request::HttpQueryParameter;
use crate::response::XmlDocument;
use crate::types::WikiResult;

/// Value of the `maxlag` parameter, in seconds.
pub const MAXLAG_SECONDS: &str = "5";

/// File name sent for every file part.
pub const FILE_PLACEHOLDER_NAME: &str = "noname";

/// HTTP executor for one wiki.
pub struct Downloader {
    client: reqwest::Client,
    wiki: WikiInfo,
    config: DownloaderConfig,
}

impl Downloader {
    pub fn new(wiki: WikiInfo, config: DownloaderConfig) -> WikiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(format!("{} wikiquery", wiki.user_agent))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            wiki,
            config,
        })
    }

    pub fn wiki(&self) -> &WikiInfo {
        &self.wiki
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// URL every request is posted to.
    pub fn endpoint(&self) -> String {
        format!("{}?rawcontinue", self.wiki.api_url())
    }

    /// The caller's parameters preceded by the protocol fields.
    pub fn assemble(&self, parameters: &[HttpQueryParameter]) -> Vec<HttpQueryParameter> {
        let mut assembled = Vec::with_capacity(parameters.len() + 2);
        assembled.push(HttpQueryParameter::value("format", "xml"));
        if self.config.use_maxlag {
            assembled.push(HttpQueryParameter::value("maxlag", MAXLAG_SECONDS));
        }
        assembled.extend(parameters.iter().cloned());
        assembled
    }

    /// Send one request and parse the response.
    pub async fn download(&self, parameters: &[HttpQueryParameter]) -> WikiResult<XmlDocument> {
        if self.config.log_requests {
            tracing::info!(
                target: "wikiquery::download",
                "{}",
                request_line(&self.wiki.api_url(), parameters)
            );
        }

        let assembled = self.assemble(parameters);
        let has_files = assembled
            .iter()
            .any(|p| matches!(p, HttpQueryParameter::File { .. }));

        let builder = self.client.post(self.endpoint());
        let builder = if has_files {
            builder.multipart(multipart_form(&assembled)?)
        } else {
            let fields: Vec<(&str, &str)> = assembled
                .iter()
                .filter_map(|p| match p {
                    HttpQueryParameter::Value { name, value } => Some((name.as_str(), value.as_str())),
                    HttpQueryParameter::File { .. } => None,
                })
                .collect();
            builder.form(&fields)
        };

        tracing::debug!(
            endpoint = %self.endpoint(),
            fields = assembled.len(),
            multipart = has_files,
            "sending request"
        );

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "received response");

        XmlDocument::parse(&body)
    }
}

/// Loggable form of a request, before the protocol fields are added.
fn request_line(api_url: &str, parameters: &[HttpQueryParameter]) -> String {
    let query = parameters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("&");
    format!("{api_url}?{query}")
}

fn multipart_form(parameters: &[HttpQueryParameter]) -> WikiResult<Form> {
    let mut form = Form::new();
    for parameter in parameters {
        form = match parameter {
            HttpQueryParameter::Value { name, value } => form.text(name.clone(), value.clone()),
            HttpQueryParameter::File { name, payload } => {
                let part = Part::bytes(payload.contents()?.to_vec()).file_name(FILE_PLACEHOLDER_NAME);
                form.part(name.clone(), part)
            }
        };
    }
    Ok(form)
}
