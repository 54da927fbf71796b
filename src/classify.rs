//! Network identifier → category code.
//!
//! Resolution is two-step: the identifier (minus any `.ext` suffix) selects a
//! metadata row, and the row's `author` selects a code from the scheme. Authors
//! that the scheme splits by habitat (the aggregate sentinel, or studies such as
//! `Havens_1992`) fall through one more level to the row's `primaryType`.
//!
//! Row selection takes the *first* matching row in file order. With the default
//! [`MatchRule::Prefix`] a row matches when its `name` starts with the lookup key,
//! so `Web_1` also selects a row named `Web_10` if that row comes first. This
//! tie-break is part of the output contract; use [`MatchRule::Exact`] to rule it out.

use tracing::{debug, warn};

use crate::error::ClassifyError;
use crate::metadata::NetworkMetadataRow;
use crate::scheme::{AuthorMapping, CategoryCode, CategoryScheme, Habitat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchRule {
    /// Row `name` starts with the lookup key.
    #[default]
    Prefix,
    /// Row `name` equals the lookup key.
    Exact,
}

impl MatchRule {
    fn matches(self, name: &str, key: &str) -> bool {
        match self {
            MatchRule::Prefix => name.starts_with(key),
            MatchRule::Exact => name == key,
        }
    }
}

/// Strips everything from the first `.`: `"Beaver_1985.csv"` → `"Beaver_1985"`.
pub fn lookup_key(identifier: &str) -> &str {
    identifier
        .split_once('.')
        .map_or(identifier, |(key, _)| key)
}

/// First row in file order whose `name` matches `key`. An empty key matches nothing.
pub fn find_row<'a>(
    key: &str,
    rows: &'a [NetworkMetadataRow],
    rule: MatchRule,
) -> Option<&'a NetworkMetadataRow> {
    if key.is_empty() {
        return None;
    }

    let mut matching = rows.iter().filter(|row| rule.matches(&row.name, key));
    let first = matching.next()?;
    let others = matching.count();
    if others > 0 {
        warn!(
            key,
            chosen = %first.name,
            others,
            "several metadata rows match; using the first in file order"
        );
    }
    Some(first)
}

pub struct Classifier<'a> {
    scheme: &'a CategoryScheme,
    rule: MatchRule,
}

impl<'a> Classifier<'a> {
    pub fn new(scheme: &'a CategoryScheme) -> Self {
        Self {
            scheme,
            rule: MatchRule::default(),
        }
    }

    pub fn with_match_rule(mut self, rule: MatchRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn classify(
        &self,
        identifier: &str,
        metadata: &[NetworkMetadataRow],
    ) -> Result<CategoryCode, ClassifyError> {
        let key = lookup_key(identifier);
        let row = find_row(key, metadata, self.rule).ok_or_else(|| ClassifyError::NotFound {
            identifier: identifier.to_string(),
            key: key.to_string(),
        })?;

        let unmapped = |field: &'static str, value: &str| ClassifyError::UnmappedCategory {
            identifier: identifier.to_string(),
            field,
            value: value.to_string(),
            scheme: self.scheme.name().to_string(),
        };

        let code = match self.scheme.lookup_author(&row.author) {
            Some(AuthorMapping::Study(code)) => code,
            Some(AuthorMapping::ByHabitat(split)) => Habitat::parse(&row.primary_type)
                .and_then(|habitat| split.get(&habitat).copied())
                .ok_or_else(|| unmapped("primaryType", &row.primary_type))?,
            None => return Err(unmapped("author", &row.author)),
        };

        debug!(
            identifier,
            row = %row.name,
            author = %row.author,
            aggregate = self.scheme.is_aggregate(&row.author),
            code,
            "classified network"
        );
        Ok(code)
    }

    /// One code per identifier, aligned with the input order. Stops at the first failure.
    pub fn classify_all<S: AsRef<str>>(
        &self,
        identifiers: &[S],
        metadata: &[NetworkMetadataRow],
    ) -> Result<Vec<CategoryCode>, ClassifyError> {
        identifiers
            .iter()
            .map(|id| self.classify(id.as_ref(), metadata))
            .collect()
    }
}

/// Classifies with the default (prefix) match rule.
pub fn classify(
    identifier: &str,
    metadata: &[NetworkMetadataRow],
    scheme: &CategoryScheme,
) -> Result<CategoryCode, ClassifyError> {
    Classifier::new(scheme).classify(identifier, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::tests::havens_scheme;
    use proptest::prelude::*;

    fn row(name: &str, author: &str, habitat: &str) -> NetworkMetadataRow {
        NetworkMetadataRow::new(name, author, habitat)
    }

    fn sample_metadata() -> Vec<NetworkMetadataRow> {
        vec![
            row("Alcorlo_et_al_2001_1", "Alcorlo_et_al_2001", "Aquatic"),
            row("Beaver_1985", "Beaver_1985", "Aquatic"),
            row("Valiela_1974", "Valiela_1974", "Aquatic and terrestrial"),
            row("Pub_aq", "One_network_per_publication", "Aquatic"),
            row("Pub_mixed", "One_network_per_publication", "Aquatic and terrestrial"),
            row("Pub_terr", "One_network_per_publication", "Terrestrial"),
        ]
    }

    #[test]
    fn lookup_key_strips_from_first_dot() {
        assert_eq!(lookup_key("Beaver_1985.csv"), "Beaver_1985");
        assert_eq!(lookup_key("web.v2.csv"), "web");
        assert_eq!(lookup_key("no_extension"), "no_extension");
    }

    #[test]
    fn beaver_resolves_to_its_study_code() {
        let scheme = CategoryScheme::default();
        let code = classify("Beaver_1985.csv", &sample_metadata(), &scheme).unwrap();
        assert_eq!(code, 4);
    }

    #[test]
    fn sentinel_falls_back_to_habitat() {
        let scheme = CategoryScheme::default();
        let metadata = sample_metadata();
        assert_eq!(classify("Pub_aq.csv", &metadata, &scheme), Ok(15));
        assert_eq!(classify("Pub_mixed.csv", &metadata, &scheme), Ok(16));
        assert_eq!(classify("Pub_terr.csv", &metadata, &scheme), Ok(17));
    }

    #[test]
    fn havens_variant_splits_study_and_aggregate() {
        let scheme = havens_scheme();
        let metadata = vec![
            row("H_lake", "Havens_1992", "Aquatic"),
            row("H_bog", "Havens_1992", "Terrestrial"),
            row("P_terr", "One_network_per_publication", "Terrestrial"),
            row("S3", "Study_03", "Aquatic"),
        ];
        assert_eq!(classify("H_lake.csv", &metadata, &scheme), Ok(21));
        assert_eq!(classify("H_bog.csv", &metadata, &scheme), Ok(22));
        assert_eq!(classify("P_terr.csv", &metadata, &scheme), Ok(25));
        assert_eq!(classify("S3.csv", &metadata, &scheme), Ok(3));

        let unsplit = vec![row("H_mixed", "Havens_1992", "Aquatic and terrestrial")];
        assert!(matches!(
            classify("H_mixed", &unsplit, &scheme),
            Err(ClassifyError::UnmappedCategory { field: "primaryType", .. })
        ));
    }

    #[test]
    fn unknown_author_is_a_hard_error() {
        let scheme = CategoryScheme::default();
        let metadata = vec![row("New_web", "Some_New_Study_2025", "Aquatic")];
        let err = classify("New_web.csv", &metadata, &scheme).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::UnmappedCategory {
                identifier: "New_web.csv".to_string(),
                field: "author",
                value: "Some_New_Study_2025".to_string(),
                scheme: "brimacombe_2023".to_string(),
            }
        );
    }

    #[test]
    fn unknown_sentinel_habitat_is_a_hard_error() {
        let scheme = CategoryScheme::default();
        let metadata = vec![row("Reef", "One_network_per_publication", "Marine")];
        let err = classify("Reef.csv", &metadata, &scheme).unwrap_err();
        assert!(err.to_string().contains("'Marine'"), "{}", err);
    }

    #[test]
    fn missing_row_is_not_found() {
        let scheme = CategoryScheme::default();
        let err = classify("Ghost_2000.csv", &sample_metadata(), &scheme).unwrap_err();
        assert_eq!(
            err,
            ClassifyError::NotFound {
                identifier: "Ghost_2000.csv".to_string(),
                key: "Ghost_2000".to_string(),
            }
        );
        assert!(matches!(
            classify(".csv", &sample_metadata(), &scheme),
            Err(ClassifyError::NotFound { .. })
        ));
    }

    #[test]
    fn prefix_rule_takes_first_row_in_file_order() {
        let scheme = CategoryScheme::default();
        let metadata = vec![
            row("Web_10", "Fryer_1959", "Aquatic"),
            row("Web_1", "Beaver_1985", "Aquatic"),
        ];
        assert_eq!(classify("Web_1.csv", &metadata, &scheme), Ok(7));

        let exact = Classifier::new(&scheme).with_match_rule(MatchRule::Exact);
        assert_eq!(exact.classify("Web_1.csv", &metadata), Ok(4));
    }

    #[test]
    fn prefix_rule_matches_longer_names() {
        let scheme = CategoryScheme::default();
        let metadata = sample_metadata();
        assert_eq!(classify("Alcorlo_et_al_2001.csv", &metadata, &scheme), Ok(0));
        let exact = Classifier::new(&scheme).with_match_rule(MatchRule::Exact);
        assert!(exact.classify("Alcorlo_et_al_2001.csv", &metadata).is_err());
    }

    #[test]
    fn classify_all_preserves_alignment() {
        let scheme = CategoryScheme::default();
        let ids = ["Pub_terr.csv", "Beaver_1985.csv", "Valiela_1974.csv", "Pub_aq.csv"];
        let codes = Classifier::new(&scheme)
            .classify_all(&ids, &sample_metadata())
            .unwrap();
        assert_eq!(codes, vec![17, 4, 14, 15]);
    }

    #[test]
    fn every_code_resolves_inside_the_scheme() {
        let scheme = CategoryScheme::default();
        let metadata = sample_metadata();
        let ids: Vec<String> = metadata.iter().map(|r| format!("{}.csv", r.name)).collect();
        let codes = Classifier::new(&scheme).classify_all(&ids, &metadata).unwrap();
        for code in codes {
            assert!(scheme.encoding_for(code).is_ok());
        }
    }

    proptest! {
        #[test]
        fn classification_is_deterministic(order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle()) {
            let scheme = CategoryScheme::default();
            let metadata = sample_metadata();
            let ids: Vec<String> = order.iter().map(|&i| format!("{}.csv", metadata[i].name)).collect();
            let classifier = Classifier::new(&scheme);
            let first = classifier.classify_all(&ids, &metadata).unwrap();
            let second = classifier.classify_all(&ids, &metadata).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
