//! Event selections: a per-event pass mask and weight, refined step by step.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;
use std::sync::Arc;

use rtb_core::{Error, Result};

/// A named selection of events with per-event weights.
///
/// Refining a selection ANDs the cut into the parent's mask and multiplies
/// the weight into the parent's weights. Selection names are unique among
/// all selections derived from the same tree.
#[derive(Debug, Clone)]
pub struct Selection {
    name: String,
    parent: Option<String>,
    mask: Arc<[bool]>,
    weights: Arc<[f64]>,
    names: Rc<RefCell<BTreeSet<String>>>,
}

impl Selection {
    /// Name of the root selection.
    pub const ROOT_NAME: &'static str = "none";

    /// All `n_events` pass with weight 1.
    pub fn root(n_events: usize) -> Self {
        let names = Rc::new(RefCell::new(BTreeSet::from([Self::ROOT_NAME.to_string()])));
        Self::with_registry(n_events, names)
    }

    pub(crate) fn with_registry(n_events: usize, names: Rc<RefCell<BTreeSet<String>>>) -> Self {
        Self {
            name: Self::ROOT_NAME.to_string(),
            parent: None,
            mask: vec![true; n_events].into(),
            weights: vec![1.0; n_events].into(),
            names,
        }
    }

    /// Derive a selection with an extra cut and/or weight factor.
    pub fn refine(&self, name: &str, cut: Option<&[bool]>, weight: Option<&[f64]>) -> Result<Self> {
        let n = self.n_events();
        if let Some(c) = cut
            && c.len() != n
        {
            return Err(Error::Validation(format!(
                "selection '{name}': cut has {} entries, expected {n}",
                c.len()
            )));
        }
        if let Some(w) = weight
            && w.len() != n
        {
            return Err(Error::Validation(format!(
                "selection '{name}': weight has {} entries, expected {n}",
                w.len()
            )));
        }
        if !self.names.borrow_mut().insert(name.to_string()) {
            return Err(Error::Validation(format!("selection name '{name}' is already used")));
        }

        let mask: Arc<[bool]> = match cut {
            Some(c) => self.mask.iter().zip(c).map(|(a, b)| *a && *b).collect(),
            None => Arc::clone(&self.mask),
        };
        let weights: Arc<[f64]> = match weight {
            Some(w) => self.weights.iter().zip(w).map(|(a, b)| a * b).collect(),
            None => Arc::clone(&self.weights),
        };

        let out = Self {
            name: name.to_string(),
            parent: Some(self.name.clone()),
            mask,
            weights,
            names: Rc::clone(&self.names),
        };
        tracing::debug!(selection = name, parent = %self.name, passed = out.n_passed(), "refined");
        Ok(out)
    }

    /// Selection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the selection this one was refined from.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Number of events (passing or not).
    pub fn n_events(&self) -> usize {
        self.mask.len()
    }

    /// Per-event pass flags.
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Per-event weights (defined for all events, passing or not).
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Number of passing events.
    pub fn n_passed(&self) -> usize {
        self.mask.iter().filter(|m| **m).count()
    }

    /// Sum of weights and of squared weights over passing events.
    pub fn sum_weights(&self) -> (f64, f64) {
        self.mask
            .iter()
            .zip(self.weights.iter())
            .filter(|(m, _)| **m)
            .fold((0.0, 0.0), |(s, s2), (_, w)| (s + w, s2 + w * w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn refine_combines_cuts_and_weights() {
        let root = Selection::root(4);
        let weighted = root.refine("withgenweight", None, Some(&[2.0, -1.0, 0.5, 1.0])).unwrap();
        let cut = weighted.refine("hasElEl", Some(&[true, true, false, false]), None).unwrap();
        let cut2 = cut.refine("more", Some(&[false, true, true, true]), Some(&[3.0; 4])).unwrap();

        assert_eq!(cut.parent(), Some("withgenweight"));
        assert_eq!(cut.n_passed(), 2);
        assert_eq!(cut2.mask(), &[false, true, false, false]);
        assert_eq!(cut2.weights(), &[6.0, -3.0, 1.5, 3.0]);

        let (sw, sw2) = cut.sum_weights();
        assert_relative_eq!(sw, 1.0);
        assert_relative_eq!(sw2, 5.0);
        assert_eq!(root.sum_weights(), (4.0, 4.0));
    }

    #[test]
    fn duplicate_names_rejected() {
        let root = Selection::root(2);
        let a = root.refine("a", None, None).unwrap();
        assert!(a.refine("a", None, None).is_err());
        assert!(root.refine("none", None, None).is_err());
        assert!(Selection::root(2).refine("a", None, None).is_ok());
    }

    #[test]
    fn length_mismatch_rejected() {
        let root = Selection::root(3);
        assert!(root.refine("c", Some(&[true]), None).is_err());
        assert!(root.refine("w", None, Some(&[1.0, 2.0])).is_err());
        // failed refinements do not reserve the name
        assert!(root.refine("c", Some(&[true; 3]), None).is_ok());
    }
}
