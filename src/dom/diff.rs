//! Structural diff between the pre-edit and post-edit trees. The
//! post-edit tree is annotated in place with diff marks; the selective
//! serializer consults them to decide which subtrees may reuse original
//! source.

use super::{DiffMarks, Document, NodeId, NodeKind};
use crate::base::CancellationToken;
use crate::errors::Canceled;

pub struct DomDiff<'c> {
    cancel: Option<&'c CancellationToken>,
}

impl Default for DomDiff<'_> {
    fn default() -> Self {
        DomDiff::new()
    }
}

#[derive(Debug, Copy, Clone, Default)]
struct Outcome {
    /// The node itself changed (attributes or data-mw).
    wrapper: bool,
    /// Something changed anywhere below the node.
    inside: bool,
}

impl Outcome {
    #[inline]
    fn any(&self) -> bool {
        self.wrapper || self.inside
    }
}

impl<'c> DomDiff<'c> {
    pub fn new() -> Self {
        DomDiff { cancel: None }
    }

    pub fn with_cancellation(cancel: &'c CancellationToken) -> Self {
        DomDiff {
            cancel: Some(cancel),
        }
    }

    /// Diffs the two trees, annotating `new_node`'s tree. Returns
    /// whether any difference was found.
    pub fn diff(
        &self,
        old: &Document,
        old_node: NodeId,
        new: &mut Document,
        new_node: NodeId,
    ) -> Result<bool, Canceled> {
        Ok(self.diff_pair(old, old_node, new, new_node)?.any())
    }

    fn diff_pair(
        &self,
        old: &Document,
        a: NodeId,
        new: &mut Document,
        b: NodeId,
    ) -> Result<Outcome, Canceled> {
        if let Some(cancel) = self.cancel {
            cancel.check()?;
        }

        let attrs_differ = !attrs_equivalent(old, a, new, b);
        let wrapper = new.is_encapsulation_wrapper(b);

        if attrs_differ {
            trace!(@diff "modified wrapper {:?}", b);

            new.add_diff_mark(b, DiffMarks::MODIFIED_WRAPPER);
        }

        // Encapsulated content is opaque: it is generated from the
        // wrapper's data-mw, so only the wrapper itself is compared.
        if wrapper {
            return Ok(Outcome {
                wrapper: attrs_differ,
                inside: false,
            });
        }

        let inside = self.diff_children(old, a, new, b)?;

        if attrs_differ && inside {
            // The structural marks force full regeneration anyway, and
            // keeping the wrapper mark would leave marked descendants
            // under it.
            new.remove_diff_mark(b, DiffMarks::MODIFIED_WRAPPER);
        }

        Ok(Outcome {
            wrapper: attrs_differ,
            inside,
        })
    }

    fn diff_children(
        &self,
        old: &Document,
        a: NodeId,
        new: &mut Document,
        b: NodeId,
    ) -> Result<bool, Canceled> {
        let old_units = group_about_units(old, a);
        let new_units = group_about_units(new, b);

        let old_keys: Vec<_> = old_units.iter().map(|u| unit_key(old, u)).collect();
        let new_keys: Vec<_> = new_units.iter().map(|u| unit_key(new, u)).collect();

        let matched = lcs_pairs(&old_keys, &new_keys);

        let mut changed = false;
        let mut oi = 0;
        let mut ni = 0;
        // Deletion markers are inserted after all units are processed
        // so child indices stay stable; recorded as original indices
        // into the new child list.
        let mut deletions: Vec<usize> = Vec::new();

        for &(mi, mj) in &matched {
            for _ in oi..mi {
                deletions.push(unit_start_index(new, b, &new_units, mj));
                changed = true;
            }

            for j in ni..mj {
                self.mark_inserted_unit(new, b, &new_units[j]);
                changed = true;
            }

            if self.diff_unit_pair(old, &old_units[mi], new, &new_units[mj])? {
                changed = true;
            }

            oi = mi + 1;
            ni = mj + 1;
        }

        for _ in oi..old_units.len() {
            deletions.push(new.children(b).len());
            changed = true;
        }

        for j in ni..new_units.len() {
            self.mark_inserted_unit(new, b, &new_units[j]);
            changed = true;
        }

        if !deletions.is_empty() {
            new.add_diff_mark(b, DiffMarks::CHILDREN_CHANGED);

            for &idx in deletions.iter().rev() {
                let marker = new.create_element("meta");

                new.set_attr(marker, "typeof", "mw:DiffMarker/deleted");
                new.insert_at(b, idx, marker);
            }
        }

        Ok(changed)
    }

    fn mark_inserted_unit(&self, new: &mut Document, parent: NodeId, unit: &[NodeId]) {
        new.add_diff_mark(parent, DiffMarks::CHILDREN_CHANGED);

        for &member in unit {
            if new.is_element(member) {
                new.add_diff_mark(member, DiffMarks::INSERTED);
            }
        }
    }

    fn diff_unit_pair(
        &self,
        old: &Document,
        old_unit: &[NodeId],
        new: &mut Document,
        new_unit: &[NodeId],
    ) -> Result<bool, Canceled> {
        let (a, b) = (old_unit[0], new_unit[0]);

        if !old.is_element(a) || !new.is_element(b) {
            // Matched text/comment units are equal by key.
            return Ok(false);
        }

        let outcome = self.diff_pair(old, a, new, b)?;

        if outcome.inside {
            new.add_diff_mark(b, DiffMarks::SUBTREE_CHANGED);
        }

        let mut changed = outcome.any();

        // Extra about-siblings in the new tree are ignored once the
        // wrapper itself is flagged as modified.
        if new.diff_marks(b).contains(DiffMarks::MODIFIED_WRAPPER) {
            return Ok(changed);
        }

        for (i, &sibling) in new_unit.iter().enumerate().skip(1) {
            match old_unit.get(i) {
                Some(&old_sibling) => {
                    let outcome = self.diff_pair(old, old_sibling, new, sibling)?;

                    if outcome.inside {
                        new.add_diff_mark(sibling, DiffMarks::SUBTREE_CHANGED);
                    }

                    changed |= outcome.any();
                }
                None => {
                    if let Some(parent) = new.parent(sibling) {
                        self.mark_inserted_unit(new, parent, &[sibling]);
                    }

                    changed = true;
                }
            }
        }

        Ok(changed)
    }
}

/// Groups an element's children into units: a run of consecutive
/// siblings sharing the same `about` is diffed as one.
fn group_about_units(doc: &Document, parent: NodeId) -> Vec<Vec<NodeId>> {
    let mut units: Vec<Vec<NodeId>> = Vec::new();

    for &child in doc.children(parent) {
        let about = doc.about(child).map(|a| a.to_string());

        if let (Some(about), Some(last)) = (&about, units.last_mut()) {
            let last_about = doc.about(last[0]);

            if last_about == Some(about.as_str()) {
                last.push(child);
                continue;
            }
        }

        units.push(vec![child]);
    }

    units
}

fn unit_start_index(doc: &Document, parent: NodeId, units: &[Vec<NodeId>], unit_idx: usize) -> usize {
    match units.get(unit_idx) {
        Some(unit) => doc
            .children(parent)
            .iter()
            .position(|&c| c == unit[0])
            .unwrap_or_else(|| doc.children(parent).len()),
        None => doc.children(parent).len(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Identity {
    Dpi(u32),
    About(String),
}

#[derive(Debug, Clone)]
enum UnitKey {
    Element {
        name: String,
        identity: Option<Identity>,
    },
    Text(String),
    Comment(String),
    Other,
}

fn unit_key(doc: &Document, unit: &[NodeId]) -> UnitKey {
    let node = unit[0];

    match doc.kind(node) {
        NodeKind::Element(el) => UnitKey::Element {
            name: el.name.clone(),
            identity: identity(doc, node),
        },
        NodeKind::Text(text) => UnitKey::Text(text.clone()),
        NodeKind::Comment(data) => UnitKey::Comment(data.clone()),
        NodeKind::Document => UnitKey::Other,
    }
}

fn identity(doc: &Document, node: NodeId) -> Option<Identity> {
    if let Some(dpi) = doc.data_parsoid(node).and_then(|dp| dp.dpi) {
        return Some(Identity::Dpi(dpi));
    }

    if doc.is_encapsulation_wrapper(node) {
        return doc.about(node).map(|a| Identity::About(a.to_string()));
    }

    None
}

fn keys_match(a: &UnitKey, b: &UnitKey) -> bool {
    match (a, b) {
        (
            UnitKey::Element {
                name: an,
                identity: ai,
            },
            UnitKey::Element {
                name: bn,
                identity: bi,
            },
        ) => {
            if an != bn {
                return false;
            }

            match (ai, bi) {
                (Some(ai), Some(bi)) => ai == bi,
                // Identity falls back to position when either side has
                // none.
                _ => true,
            }
        }
        (UnitKey::Text(a), UnitKey::Text(b)) => a == b,
        (UnitKey::Comment(a), UnitKey::Comment(b)) => a == b,
        _ => false,
    }
}

/// Longest common subsequence over unit keys; returns matched index
/// pairs in order.
fn lcs_pairs(old: &[UnitKey], new: &[UnitKey]) -> Vec<(usize, usize)> {
    let (n, m) = (old.len(), new.len());
    let mut table = vec![0u32; (n + 1) * (m + 1)];
    let at = |i: usize, j: usize| i * (m + 1) + j;

    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[at(i, j)] = if keys_match(&old[i], &new[j]) {
                table[at(i + 1, j + 1)] + 1
            } else {
                table[at(i + 1, j)].max(table[at(i, j + 1)])
            };
        }
    }

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < n && j < m {
        if keys_match(&old[i], &new[j]) && table[at(i, j)] == table[at(i + 1, j + 1)] + 1 {
            pairs.push((i, j));
            i += 1;
            j += 1;
        } else if table[at(i + 1, j)] >= table[at(i, j + 1)] {
            i += 1;
        } else {
            j += 1;
        }
    }

    pairs
}

/// Attribute equivalence for pairing. Side-band bookkeeping
/// (`data-parsoid`, `about`) is excluded; the stored `data-mw` payload
/// participates, since for wrappers it is the content.
fn attrs_equivalent(old: &Document, a: NodeId, new: &Document, b: NodeId) -> bool {
    const IGNORED: &[&str] = &["data-parsoid", "data-mw", "about"];

    let mut old_attrs: Vec<(&str, &str)> = old
        .attrs(a)
        .iter()
        .filter(|attr| !IGNORED.contains(&attr.name.as_str()))
        .map(|attr| (attr.name.as_str(), attr.value.as_str()))
        .collect();
    let mut new_attrs: Vec<(&str, &str)> = new
        .attrs(b)
        .iter()
        .filter(|attr| !IGNORED.contains(&attr.name.as_str()))
        .map(|attr| (attr.name.as_str(), attr.value.as_str()))
        .collect();

    old_attrs.sort_unstable();
    new_attrs.sort_unstable();

    old_attrs == new_attrs && old.data_mw(a) == new.data_mw(b)
}
