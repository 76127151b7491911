use super::{Document, NodeId};
use crate::base::{Dsr, SourceRange};
use bitflags::bitflags;
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

bitflags! {
    /// Diff annotations attached to elements of the post-edit tree.
    #[derive(Default)]
    pub struct DiffMarks: u8 {
        const INSERTED         = 0b0000_0001;
        const DELETED          = 0b0000_0010;
        const CHILDREN_CHANGED = 0b0000_0100;
        const SUBTREE_CHANGED  = 0b0000_1000;
        const MODIFIED_WRAPPER = 0b0001_0000;
    }
}

#[inline]
fn is_false(v: &bool) -> bool {
    !*v
}

/// `fl` arrives as an array of flag codes, but legacy emitters produce
/// an empty object for the empty case.
fn string_list_or_empty_object<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let value = Value::deserialize(d)?;

    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        _ => Ok(Vec::new()),
    }
}

/// In-memory scratch data; never serialized.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DomTmp {
    /// Set by `load_data_attribs` with `mark_new` for nodes that had no
    /// data-parsoid record.
    pub is_new: bool,
}

/// The data-parsoid record of a node: internal bookkeeping the editors
/// round-trip but never interpret. Unknown keys survive through
/// `extra`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct DataParsoid {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsr: Option<Dsr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsr: Option<SourceRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stx: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(rename = "magicSrc", skip_serializing_if = "Option::is_none")]
    pub magic_src: Option<String>,
    #[serde(rename = "unwrappedWT", skip_serializing_if = "Option::is_none")]
    pub unwrapped_wt: Option<String>,
    #[serde(rename = "firstWikitextNode", skip_serializing_if = "Option::is_none")]
    pub first_wikitext_node: Option<String>,
    #[serde(rename = "autoInsertedStart", skip_serializing_if = "is_false")]
    pub auto_inserted_start: bool,
    #[serde(rename = "autoInsertedEnd", skip_serializing_if = "is_false")]
    pub auto_inserted_end: bool,
    /// Pairing identity assigned when the pre-edit document was
    /// prepared; editors carry it through unchanged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    /// Original language-variant flags, in source order.
    #[serde(
        deserialize_with = "string_list_or_empty_object",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub fl: Vec<String>,
    /// Run-length encoded whitespace around variant flags.
    #[serde(rename = "flSp", skip_serializing_if = "Vec::is_empty")]
    pub fl_sp: Vec<Value>,
    /// Run-length encoded whitespace inside the variant body.
    #[serde(rename = "tSp", skip_serializing_if = "Vec::is_empty")]
    pub t_sp: Vec<Value>,
    #[serde(skip)]
    pub tmp: DomTmp,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Side-band container of a single node.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeData {
    pub parsoid: DataParsoid,
    pub mw: Option<Value>,
    pub diff: DiffMarks,
}

#[derive(Debug, Default)]
pub(crate) struct DataStore {
    slots: Vec<NodeData>,
}

impl DataStore {
    fn allocate(&mut self) -> usize {
        self.slots.push(NodeData::default());

        self.slots.len() - 1
    }
}

#[derive(Debug, Copy, Clone, Default)]
pub struct LoadOptions {
    /// Flag nodes that arrive without a data-parsoid record as newly
    /// inserted by the editor.
    pub mark_new: bool,
}

impl Document {
    fn ensure_data_id(&mut self, node: NodeId) -> usize {
        if let Some(id) = self.nodes[node.0].data_id {
            return id;
        }

        let id = self.store.allocate();

        self.nodes[node.0].data_id = Some(id);

        id
    }

    pub fn node_data(&self, node: NodeId) -> Option<&NodeData> {
        self.nodes[node.0].data_id.map(|id| &self.store.slots[id])
    }

    pub fn node_data_mut(&mut self, node: NodeId) -> &mut NodeData {
        let id = self.ensure_data_id(node);

        &mut self.store.slots[id]
    }

    pub fn data_parsoid(&self, node: NodeId) -> Option<&DataParsoid> {
        self.node_data(node).map(|d| &d.parsoid)
    }

    pub fn data_parsoid_mut(&mut self, node: NodeId) -> &mut DataParsoid {
        &mut self.node_data_mut(node).parsoid
    }

    pub fn data_mw(&self, node: NodeId) -> Option<&Value> {
        self.node_data(node).and_then(|d| d.mw.as_ref())
    }

    pub fn set_data_mw(&mut self, node: NodeId, mw: Value) {
        self.node_data_mut(node).mw = Some(mw);
    }

    pub fn diff_marks(&self, node: NodeId) -> DiffMarks {
        self.node_data(node).map(|d| d.diff).unwrap_or_default()
    }

    pub fn add_diff_mark(&mut self, node: NodeId, mark: DiffMarks) {
        self.node_data_mut(node).diff |= mark;
    }

    pub fn remove_diff_mark(&mut self, node: NodeId, mark: DiffMarks) {
        self.node_data_mut(node).diff &= !mark;
    }

    /// True when `node` or any descendant carries a diff mark.
    pub fn subtree_has_diff_marks(&self, node: NodeId) -> bool {
        if !self.diff_marks(node).is_empty() {
            return true;
        }

        self.descendants(node)
            .any(|n| !self.diff_marks(n).is_empty())
    }

    /// Moves the `data-parsoid` / `data-mw` attribute JSON of `node`
    /// into the store and deletes the attributes.
    pub fn load_data_attribs(&mut self, node: NodeId, opts: LoadOptions) {
        if !self.is_element(node) {
            return;
        }

        match self.remove_attr(node, "data-parsoid") {
            Some(json) => match serde_json::from_str::<DataParsoid>(&json) {
                Ok(dp) => *self.data_parsoid_mut(node) = dp,
                Err(err) => {
                    warn!("dom: discarding unparsable data-parsoid attribute: {}", err);
                }
            },
            None => {
                if opts.mark_new {
                    self.data_parsoid_mut(node).tmp.is_new = true;
                }
            }
        }

        if let Some(json) = self.remove_attr(node, "data-mw") {
            match serde_json::from_str::<Value>(&json) {
                Ok(mw) => self.set_data_mw(node, mw),
                Err(err) => {
                    warn!("dom: discarding unparsable data-mw attribute: {}", err);
                }
            }
        }
    }

    /// Writes the store record of `node` back to its serialized
    /// attribute form. Diff marks are in-memory only and never leave
    /// the store.
    pub fn store_data_attribs(&mut self, node: NodeId) {
        if !self.is_element(node) {
            return;
        }

        let (parsoid_json, mw_json) = match self.node_data(node) {
            Some(data) => (
                serde_json::to_string(&data.parsoid).expect("data-parsoid serialization"),
                data.mw
                    .as_ref()
                    .map(|mw| serde_json::to_string(mw).expect("data-mw serialization")),
            ),
            None => return,
        };

        self.set_attr(node, "data-parsoid", parsoid_json);

        if let Some(mw_json) = mw_json {
            self.set_attr(node, "data-mw", mw_json);
        }
    }

    pub fn load_all_data_attribs(&mut self, opts: LoadOptions) {
        let nodes: Vec<_> = self.descendants(self.root()).collect();

        for node in nodes {
            self.load_data_attribs(node, opts);
        }
    }

    pub fn store_all_data_attribs(&mut self) {
        let nodes: Vec<_> = self.descendants(self.root()).collect();

        for node in nodes {
            self.store_data_attribs(node);
        }
    }
}
