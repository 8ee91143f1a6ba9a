//! Scene configuration document.
//!
//! A viewer widget publishes `sceneconfig.json` next to its pyramids. Each
//! view mode carries the pyramid metadata shared by its folders and either a
//! list of page folders or a single pyramid folder:
//!
//! ```json
//! {
//!   "viewModes": {
//!     "items": [
//!       {
//!         "pyramidMetadata": { "width": 4000, "height": 3000, "tileSize": 254, "format": "jpg" },
//!         "pageFolders": ["pages/page1_files", "pages/page2_files"]
//!       },
//!       {
//!         "pyramidMetadata": { "width": 2000, "height": 2000, "tileSize": 254, "format": "png" },
//!         "pyramidFolder": "overview_files"
//!       }
//!     ]
//!   }
//! }
//! ```

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::SceneError;
use crate::fetch::SourceLocation;
use crate::pyramid::PyramidMetadata;

/// File name of the scene document under the widget URL.
pub const SCENE_CONFIG_FILE: &str = "sceneconfig.json";

// =============================================================================
// Document Model
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneConfig {
    pub view_modes: ViewModes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewModes {
    #[serde(default)]
    pub items: Vec<ViewMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewMode {
    pub pyramid_metadata: PyramidMetadata,

    #[serde(default)]
    pub page_folders: Option<Vec<String>>,

    #[serde(default)]
    pub pyramid_folder: Option<String>,
}

impl SceneConfig {
    /// Parse a scene document.
    pub fn from_json(text: &str) -> Result<Self, SceneError> {
        serde_json::from_str(text).map_err(|e| SceneError::Parse(e.to_string()))
    }

    /// Flatten every view mode into its pyramid folders, in document order.
    ///
    /// `pageFolders` takes precedence over `pyramidFolder` when both exist.
    pub fn folders(&self) -> Result<Vec<PyramidFolder>, SceneError> {
        let mut folders = Vec::new();

        for (index, item) in self.view_modes.items.iter().enumerate() {
            let names: Vec<&String> = match (&item.page_folders, &item.pyramid_folder) {
                (Some(pages), _) => pages.iter().collect(),
                (None, Some(folder)) => vec![folder],
                (None, None) => return Err(SceneError::MissingFolder { index }),
            };

            folders.extend(names.into_iter().map(|name| PyramidFolder {
                name: name.clone(),
                metadata: item.pyramid_metadata.clone(),
            }));
        }

        Ok(folders)
    }
}

// =============================================================================
// Pyramid Folder
// =============================================================================

/// One named pyramid published by the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PyramidFolder {
    /// Folder path relative to the widget URL (e.g. `pages/page1_files`)
    pub name: String,

    pub metadata: PyramidMetadata,
}

impl PyramidFolder {
    /// Remote location of this folder under a normalized widget URL.
    pub fn location(&self, widget_url: &str) -> SourceLocation {
        let base_url = format!(
            "{}/{}",
            widget_url.trim_end_matches('/'),
            self.name.trim_start_matches('/')
        );
        SourceLocation::new(self.name.clone(), base_url)
    }

    /// Output file stem for `level`, e.g. `pages_page1_LVL12`.
    pub fn output_stem(&self, level: usize) -> String {
        format!(
            "{}_LVL{}",
            self.name.replace("_files", "").replace('/', "_"),
            level
        )
    }

    /// Whether this folder passes an optional name filter.
    pub fn matches(&self, filter: Option<&str>) -> bool {
        folder_matches(&self.name, filter)
    }
}

/// Case-insensitive substring match; `None` matches everything.
pub fn folder_matches(name: &str, filter: Option<&str>) -> bool {
    match filter {
        None => true,
        Some(filter) => name.to_lowercase().contains(&filter.to_lowercase()),
    }
}

// =============================================================================
// Fetching
// =============================================================================

/// Parse a widget URL and make sure it ends with `/`.
pub fn normalize_widget_url(raw: &str) -> Result<String, SceneError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| SceneError::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(SceneError::InvalidUrl {
            url: raw.to_string(),
            message: "URL cannot be a base".to_string(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url.to_string())
}

/// Download and parse `{widget_url}sceneconfig.json`.
pub async fn fetch_scene(client: &Client, widget_url: &str) -> Result<SceneConfig, SceneError> {
    let widget_url = normalize_widget_url(widget_url)?;
    let url = format!("{}{}", widget_url, SCENE_CONFIG_FILE);

    debug!(url = %url, "Fetching scene document");

    let http_error = |message: String| SceneError::Http {
        url: url.clone(),
        message,
    };

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| http_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(http_error(format!("HTTP status {}", status.as_u16())));
    }

    let text = response
        .text()
        .await
        .map_err(|e| http_error(e.to_string()))?;

    SceneConfig::from_json(&text)
}
