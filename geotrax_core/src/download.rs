//! Blocking HTTP fetch-to-file, the only network primitive the acquire
//! subsystem needs.

use std::fs::File;
use std::io;
use std::path::Path;

use log::{debug, info};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::error::GeotraxError;

/// Hook run over the downloaded file before it is handed to the caller,
/// e.g. transparent decompression.
pub type ConvertFile = fn(&Path) -> Result<(), GeotraxError>;

#[derive(Debug, Clone, Default)]
pub struct DownloadOptions {
    /// 0 disables redirect following. The default of 2 matches what the
    /// data sources expect of their endpoints.
    pub max_redirects: Option<usize>,
    pub basic_auth: Option<(String, String)>,
    pub convert_file: Option<ConvertFile>,
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_basic_auth(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            basic_auth: Some((user.into(), password.into())),
            ..Self::default()
        }
    }
}

pub struct DownloadHandle {
    options: DownloadOptions,
    client: Client,
}

impl DownloadHandle {
    pub fn new(options: &DownloadOptions) -> Result<Self, GeotraxError> {
        let redirects = options.max_redirects.unwrap_or(2);
        let policy = if redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(redirects)
        };
        let client = Client::builder().redirect(policy).build()?;
        Ok(Self {
            options: options.clone(),
            client,
        })
    }

    /// Fetch `url` into `target`, overwriting it.
    pub fn perform_download(&self, url: &str, target: &Path) -> Result<(), GeotraxError> {
        info!("Downloading {url} to {:?}", target);

        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.options.basic_auth {
            request = request.basic_auth(user, Some(password));
        }

        let mut response = request.send()?;
        if !response.status().is_success() {
            return Err(GeotraxError::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let mut file = File::create(target).map_err(|source| GeotraxError::CreateFile {
            path: target.to_owned(),
            source,
        })?;
        let bytes = io::copy(&mut response, &mut file)?;
        debug!("Downloaded {bytes} bytes from {url}");

        if let Some(convert) = self.options.convert_file {
            convert(target)?;
        }
        Ok(())
    }

    /// Fetch `url` and return the body as a string.
    pub fn fetch_string(&self, url: &str) -> Result<String, GeotraxError> {
        debug!("Fetching {url}");
        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.options.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send()?;
        if !response.status().is_success() {
            return Err(GeotraxError::DownloadFailed {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.text()?)
    }
}
