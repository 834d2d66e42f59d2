//! Per-model feature column selection.
//!
//! A model that declares the columns it was trained on gets those columns (in
//! its own order) that the uploaded table actually has. Models without a
//! declaration, or whose declaration matches nothing, fall back to a fixed
//! candidate list.

use crate::types::table::Table;

/// Picks the usable columns of a table for one model
#[derive(Debug, Clone)]
pub struct FeatureSelector {
    candidates: Vec<String>,
}

impl FeatureSelector {
    /// Create a selector with the fallback candidate list, in priority order.
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    /// Fallback column names.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Select the feature set for a model.
    ///
    /// Returns an empty list when nothing usable is present; the caller turns
    /// that into a request error.
    pub fn select(&self, table: &Table, declared: Option<&[String]>) -> Vec<String> {
        if let Some(declared) = declared {
            let feats: Vec<String> = declared
                .iter()
                .filter(|name| table.has_column(name))
                .cloned()
                .collect();
            if !feats.is_empty() {
                return feats;
            }
        }

        self.candidates
            .iter()
            .filter(|name| table.has_column(name))
            .cloned()
            .collect()
    }
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self::new(crate::config::CandidateProfile::default().columns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str]) -> Table {
        Table::new(
            columns.iter().map(|c| c.to_string()).collect(),
            vec![vec!["1".to_string(); columns.len()]],
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_declared_order_preserved() {
        let selector = FeatureSelector::default();
        let t = table(&["st_teff", "pl_rade", "koi_score"]);
        let declared = names(&["koi_score", "missing", "pl_rade"]);

        let feats = selector.select(&t, Some(&declared));
        assert_eq!(feats, names(&["koi_score", "pl_rade"]));
    }

    #[test]
    fn test_fallback_when_declared_absent() {
        let selector = FeatureSelector::default();
        let t = table(&["pl_rade", "st_teff", "pl_orbper"]);

        let feats = selector.select(&t, None);
        // candidate order, not table order
        assert_eq!(feats, names(&["st_teff", "pl_orbper", "pl_rade"]));
    }

    #[test]
    fn test_fallback_when_declared_disjoint() {
        let selector = FeatureSelector::default();
        let t = table(&["pl_eqt"]);
        let declared = names(&["koi_period"]);

        assert_eq!(selector.select(&t, Some(&declared)), names(&["pl_eqt"]));
    }

    #[test]
    fn test_nothing_usable() {
        let selector = FeatureSelector::new(names(&["snr", "period"]));
        let t = table(&["foo", "bar"]);

        assert!(selector.select(&t, None).is_empty());
        assert_eq!(selector.candidates(), &["snr", "period"]);
    }
}
