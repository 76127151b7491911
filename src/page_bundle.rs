//! The persisted output object: HTML plus the side-band data keyed by
//! node ID, with its validation rules and content-type profiles.

use crate::dom::serializer::{serialize, XmlSerializerOpts};
use crate::dom::{DataParsoid, Document};
use crate::errors::BundleValidationError;
use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Bundles with this version split `data-mw` out of the HTML, so the
/// bag becomes mandatory.
static SPLIT_DATA_MW_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^999\.0\.0").unwrap());

const DEFAULT_VERSION: &str = "1.0.0";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SidebandBag {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<HashMap<String, Value>>,
}

impl SidebandBag {
    fn with_ids(ids: HashMap<String, Value>) -> Self {
        SidebandBag { ids: Some(ids) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PageBundle {
    #[serde(default)]
    pub html: String,
    #[serde(rename = "data-parsoid", default, skip_serializing_if = "Option::is_none")]
    pub data_parsoid: Option<SidebandBag>,
    #[serde(rename = "data-mw", default, skip_serializing_if = "Option::is_none")]
    pub data_mw: Option<SidebandBag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PageBundle {
    /// Checks the bundle shape. No partial result may be consumed from
    /// a bundle that fails here.
    pub fn validate(&self) -> Result<(), BundleValidationError> {
        if self
            .data_parsoid
            .as_ref()
            .and_then(|bag| bag.ids.as_ref())
            .is_none()
        {
            return Err(BundleValidationError::new("missing data-parsoid.ids"));
        }

        let needs_mw = self
            .version
            .as_deref()
            .map(|v| SPLIT_DATA_MW_VERSION.is_match(v))
            .unwrap_or(false);

        if needs_mw
            && self
                .data_mw
                .as_ref()
                .and_then(|bag| bag.ids.as_ref())
                .is_none()
        {
            return Err(BundleValidationError::new(
                "missing data-mw.ids for a 999.0.0 bundle",
            ));
        }

        Ok(())
    }

    fn version_str(&self) -> &str {
        self.version.as_deref().unwrap_or(DEFAULT_VERSION)
    }

    pub fn html_content_type(&self) -> String {
        format!(
            "text/html; charset=utf-8; profile=\"https://www.mediawiki.org/wiki/Specs/HTML/{}\"",
            self.version_str()
        )
    }

    pub fn pagebundle_content_type(&self) -> String {
        format!(
            "application/json; charset=utf-8; profile=\"https://www.mediawiki.org/wiki/Specs/pagebundle/{}\"",
            self.version_str()
        )
    }

    /// Moves a document's side-band store into id-keyed bags and
    /// serializes the HTML. Elements carrying data get an `id`
    /// assigned when they arrived without one.
    pub fn extract(doc: &mut Document) -> PageBundle {
        let mut parsoid_ids: HashMap<String, Value> = HashMap::new();
        let mut mw_ids: HashMap<String, Value> = HashMap::new();
        let mut next_id = 0u32;

        let nodes: Vec<_> = doc.descendants(doc.root()).collect();

        for node in nodes {
            if !doc.is_element(node) {
                continue;
            }

            let (parsoid, mw) = match doc.node_data(node) {
                Some(data) => (
                    serde_json::to_value(&data.parsoid).expect("data-parsoid serialization"),
                    data.mw.clone(),
                ),
                None => continue,
            };

            let id = match doc.attr(node, "id") {
                Some(id) => id.to_string(),
                None => {
                    let id = format!("mw{}", next_id);

                    next_id += 1;
                    doc.set_attr(node, "id", id.clone());

                    id
                }
            };

            parsoid_ids.insert(id.clone(), parsoid);

            if let Some(mw) = mw {
                mw_ids.insert(id, mw);
            }
        }

        let html = serialize(doc, doc.root(), &XmlSerializerOpts::default()).html;

        PageBundle {
            html,
            data_parsoid: Some(SidebandBag::with_ids(parsoid_ids)),
            data_mw: Some(SidebandBag::with_ids(mw_ids)),
            version: None,
        }
    }

    /// Re-attaches the bags to a freshly loaded document by `id`.
    pub fn apply(&self, doc: &mut Document) {
        let parsoid_ids = self
            .data_parsoid
            .as_ref()
            .and_then(|bag| bag.ids.as_ref());
        let mw_ids = self.data_mw.as_ref().and_then(|bag| bag.ids.as_ref());

        let nodes: Vec<_> = doc.descendants(doc.root()).collect();

        for node in nodes {
            let id = match doc.attr(node, "id") {
                Some(id) => id.to_string(),
                None => continue,
            };

            if let Some(value) = parsoid_ids.and_then(|ids| ids.get(&id)) {
                match serde_json::from_value::<DataParsoid>(value.clone()) {
                    Ok(dp) => *doc.data_parsoid_mut(node) = dp,
                    Err(err) => {
                        warn!("page bundle: skipping bad data-parsoid for #{}: {}", id, err);
                    }
                }
            }

            if let Some(value) = mw_ids.and_then(|ids| ids.get(&id)) {
                doc.set_data_mw(node, value.clone());
            }
        }
    }
}
