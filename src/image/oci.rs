//! OCI image manifest/index/config types, used by the registry and ORAS
//! transports to parse what they pull, and by the inspector to read an
//! `oci-in-file` artifact's embedded layout.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type Annotations = HashMap<String, String>;
/// The cryptographic checksum digest of an object, `<algorithm>:<encoded>`.
pub type Digest = String;
pub type MediaType = String;
pub type Url = String;

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ContentDescriptor {
    pub annotations: Option<Annotations>,
    pub digest: Digest,
    #[serde(rename = "mediaType")]
    pub media_type: MediaType,
    pub size: i64,
    pub urls: Option<Vec<Url>>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ImageManifest {
    pub annotations: Option<Annotations>,
    pub config: ContentDescriptor,
    pub layers: Vec<ContentDescriptor>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: i64,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ImageIndexItemManifestsPlatform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.features")]
    pub os_features: Option<Vec<String>>,
    #[serde(rename = "os.version")]
    pub os_version: Option<String>,
    pub variant: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ImageIndexItemManifests {
    pub annotations: Option<Annotations>,
    pub digest: Digest,
    #[serde(rename = "mediaType")]
    pub media_type: MediaType,
    pub platform: Option<ImageIndexItemManifestsPlatform>,
    pub size: i64,
    pub urls: Option<Vec<Url>>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ImageIndex {
    pub annotations: Option<Annotations>,
    pub manifests: Vec<ImageIndexItemManifests>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: i64,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ImageLayout {
    #[serde(rename = "imageLayoutVersion")]
    pub image_layout_version: String,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "Cmd")]
    pub cmd: Option<Vec<String>>,
    #[serde(rename = "Entrypoint")]
    pub entrypoint: Option<Vec<String>>,
    #[serde(rename = "Env")]
    pub env: Option<Vec<String>>,
    #[serde(rename = "ExposedPorts")]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "Labels")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(rename = "StopSignal")]
    pub stop_signal: Option<String>,
    #[serde(rename = "User")]
    pub user: Option<String>,
    #[serde(rename = "Volumes")]
    pub volumes: Option<HashMap<String, serde_json::Value>>,
    #[serde(rename = "WorkingDir")]
    pub working_dir: Option<String>,
}

#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct ItemHistory {
    pub author: Option<String>,
    pub comment: Option<String>,
    pub created: Option<String>,
    pub created_by: Option<String>,
    pub empty_layer: Option<bool>,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct ItemHistoryRootfs {
    pub diff_ids: Vec<String>,
    #[serde(rename = "type")]
    pub item_type: String,
}

#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
pub struct RootConfig {
    pub architecture: String,
    pub author: Option<String>,
    pub config: Option<Config>,
    pub created: Option<String>,
    pub history: Option<Vec<ItemHistory>>,
    pub os: String,
    pub rootfs: ItemHistoryRootfs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_manifest_round_trips() {
        let manifest = ImageManifest {
            annotations: None,
            config: ContentDescriptor {
                annotations: None,
                digest: "sha256:abc".to_string(),
                media_type: "application/vnd.oci.image.config.v1+json".to_string(),
                size: 100,
                urls: None,
            },
            layers: vec![],
            schema_version: 2,
        };
        let json = serde_json::to_string(&manifest).unwrap();
        let back: ImageManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
