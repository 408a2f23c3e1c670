//! Tree decoration for Phase-2 flat trees.
//!
//! Scalar branches are exposed by name. Jagged branches named
//! `<collection>_<attribute>` (`elec_pt`, `jetpuppi_eta`, …) are grouped into
//! object collections; all attributes of a collection must share offsets.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

use rtb_core::{Error, Result};

use crate::events::{Column, EventFrame, Jagged};
use crate::selection::Selection;

/// A decorated event tree.
#[derive(Debug)]
pub struct EventTree {
    frame: EventFrame,
    collections: BTreeMap<String, Collection>,
    selection_names: Rc<RefCell<BTreeSet<String>>>,
}

impl EventTree {
    /// Decorate an event table.
    pub fn decorate(frame: EventFrame) -> Result<Self> {
        let mut grouped: BTreeMap<String, (Vec<usize>, BTreeMap<String, Vec<f64>>)> =
            BTreeMap::new();

        for (name, column) in frame.iter() {
            let Column::Jagged(j) = column else { continue };
            let Some((coll, attr)) =
                name.split_once('_').filter(|(c, a)| !c.is_empty() && !a.is_empty())
            else {
                continue;
            };
            let entry = grouped
                .entry(coll.to_string())
                .or_insert_with(|| (j.offsets.clone(), BTreeMap::new()));
            if entry.0 != j.offsets {
                return Err(Error::Validation(format!(
                    "branch '{name}' does not share offsets with the other '{coll}' branches"
                )));
            }
            entry.1.insert(attr.to_string(), j.flat.clone());
        }

        let collections = grouped
            .into_iter()
            .map(|(name, (offsets, attrs))| {
                let coll = Collection::base(name.clone(), offsets, attrs);
                (name, coll)
            })
            .collect::<BTreeMap<_, _>>();

        tracing::debug!(
            events = frame.n_events(),
            collections = ?collections.keys().collect::<Vec<_>>(),
            "tree decorated"
        );

        let selection_names =
            Rc::new(RefCell::new(BTreeSet::from([Selection::ROOT_NAME.to_string()])));
        Ok(Self { frame, collections, selection_names })
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.frame.n_events()
    }

    /// The undecorated table.
    pub fn frame(&self) -> &EventFrame {
        &self.frame
    }

    /// Scalar branch by name.
    pub fn scalar(&self, name: &str) -> Result<&[f64]> {
        match self.frame.column(name) {
            Some(Column::Scalar(v)) => Ok(v),
            Some(Column::Jagged(_)) => {
                Err(Error::Validation(format!("branch '{name}' is jagged, expected a scalar")))
            }
            None => Err(Error::Validation(format!("no branch '{name}' in tree"))),
        }
    }

    /// Jagged branch by its full name.
    pub fn jagged(&self, name: &str) -> Result<&Jagged> {
        match self.frame.column(name) {
            Some(Column::Jagged(j)) => Ok(j),
            Some(Column::Scalar(_)) => Err(Error::Validation(format!(
                "branch '{name}' is scalar, expected a jagged branch"
            ))),
            None => Err(Error::Validation(format!("no branch '{name}' in tree"))),
        }
    }

    /// Object collection by prefix.
    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.collections.get(name).ok_or_else(|| {
            Error::Validation(format!(
                "no collection '{name}' in tree (available: {:?})",
                self.collections.keys().collect::<Vec<_>>()
            ))
        })
    }

    /// Names of the decorated collections.
    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// The selection every event passes with weight 1.
    pub fn root_selection(&self) -> Selection {
        Selection::with_registry(self.n_events(), Rc::clone(&self.selection_names))
    }

    /// A constant-zero per-event column.
    pub fn zeros(&self) -> Vec<f64> {
        vec![0.0; self.n_events()]
    }
}

/// A (possibly filtered) per-event list of objects.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    attrs: Arc<BTreeMap<String, Vec<f64>>>,
    /// Per-event boundaries into `indices`.
    offsets: Vec<usize>,
    /// Positions of the selected objects in the attribute arrays.
    indices: Vec<usize>,
}

/// One object of a [`Collection`].
#[derive(Debug, Clone, Copy)]
pub struct Object<'a> {
    collection: &'a Collection,
    index: usize,
}

impl Object<'_> {
    /// Attribute value of this object.
    pub fn get(&self, attr: &str) -> Result<f64> {
        self.collection.attr(attr).map(|values| values[self.index])
    }
}

impl Collection {
    fn base(name: String, offsets: Vec<usize>, attrs: BTreeMap<String, Vec<f64>>) -> Self {
        let total = offsets.last().copied().unwrap_or(0);
        Self { name, attrs: Arc::new(attrs), offsets, indices: (0..total).collect() }
    }

    fn attr(&self, attr: &str) -> Result<&[f64]> {
        self.attrs.get(attr).map(Vec::as_slice).ok_or_else(|| {
            Error::Validation(format!("no branch '{}_{attr}' in tree", self.name))
        })
    }

    /// Collection name (branch prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Attribute names.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(String::as_str)
    }

    /// Keep the objects for which `predicate` holds.
    pub fn select<F>(&self, predicate: F) -> Result<Collection>
    where
        F: Fn(&Object<'_>) -> Result<bool>,
    {
        let mut offsets = Vec::with_capacity(self.offsets.len());
        let mut indices = Vec::with_capacity(self.indices.len());
        offsets.push(0);
        for w in self.offsets.windows(2) {
            for &index in &self.indices[w[0]..w[1]] {
                if predicate(&Object { collection: self, index })? {
                    indices.push(index);
                }
            }
            offsets.push(indices.len());
        }
        tracing::trace!(
            collection = %self.name,
            before = self.indices.len(),
            after = indices.len(),
            "select"
        );
        Ok(Collection { name: self.name.clone(), attrs: Arc::clone(&self.attrs), offsets, indices })
    }

    /// Number of objects per event.
    pub fn len(&self) -> Vec<f64> {
        self.offsets.windows(2).map(|w| (w[1] - w[0]) as f64).collect()
    }

    /// Whether no event holds any object.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// One attribute of every object, per event.
    pub fn map(&self, attr: &str) -> Result<Jagged> {
        let values = self.attr(attr)?;
        Ok(Jagged {
            flat: self.indices.iter().map(|&i| values[i]).collect(),
            offsets: self.offsets.clone(),
        })
    }

    /// A derived quantity of every object, per event.
    pub fn map_with<F>(&self, f: F) -> Result<Jagged>
    where
        F: Fn(&Object<'_>) -> Result<f64>,
    {
        let flat = self
            .indices
            .iter()
            .map(|&index| f(&Object { collection: self, index }))
            .collect::<Result<Vec<_>>>()?;
        Ok(Jagged { flat, offsets: self.offsets.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> EventTree {
        let frame = EventFrame::default()
            .with_scalar("genweight", vec![1.0, 0.5, 2.0])
            .unwrap()
            .with_jagged("elec_pt", Jagged::from_rows(&[vec![25.0, 15.0], vec![30.0], vec![]]))
            .unwrap()
            .with_jagged("elec_eta", Jagged::from_rows(&[vec![0.1, 0.2], vec![2.7], vec![]]))
            .unwrap()
            .with_jagged("jetpuppi_pt", Jagged::from_rows(&[vec![40.0], vec![], vec![1.0, 2.0]]))
            .unwrap();
        EventTree::decorate(frame).unwrap()
    }

    #[test]
    fn collections_grouped_by_prefix() {
        let t = tree();
        assert_eq!(t.collection_names().collect::<Vec<_>>(), ["elec", "jetpuppi"]);
        assert_eq!(t.collection("elec").unwrap().attributes().collect::<Vec<_>>(), ["eta", "pt"]);
        assert_eq!(t.collection("jetpuppi").unwrap().len(), vec![1.0, 0.0, 2.0]);
    }

    #[test]
    fn select_and_map() {
        let t = tree();
        let elec = t.collection("elec").unwrap();
        let sel = elec
            .select(|el| Ok(el.get("pt")? > 20.0 && el.get("eta")?.abs() < 2.5))
            .unwrap();
        assert_eq!(sel.len(), vec![1.0, 0.0, 0.0]);
        assert_eq!(sel.map("pt").unwrap(), Jagged::from_rows(&[vec![25.0], vec![], vec![]]));

        let twice = sel.map_with(|el| Ok(2.0 * el.get("pt")?)).unwrap();
        assert_eq!(twice.flat, vec![50.0]);
    }

    #[test]
    fn missing_branches_are_named() {
        let t = tree();
        assert!(t.scalar("nope").unwrap_err().to_string().contains("'nope'"));
        assert!(t.scalar("elec_pt").is_err());
        let elec = t.collection("elec").unwrap();
        let err = elec.select(|el| Ok(el.get("phi")? > 0.0)).unwrap_err();
        assert!(err.to_string().contains("elec_phi"));
    }

    #[test]
    fn mismatched_offsets_rejected() {
        let frame = EventFrame::default()
            .with_jagged("elec_pt", Jagged::from_rows(&[vec![1.0], vec![]]))
            .unwrap()
            .with_jagged("elec_eta", Jagged::from_rows(&[vec![], vec![1.0]]))
            .unwrap();
        let err = EventTree::decorate(frame).unwrap_err();
        assert!(err.to_string().contains("elec_eta"));
    }
}
