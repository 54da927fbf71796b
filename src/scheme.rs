use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SchemeError;

/// Index into a scheme's entry list. Dense, starting at 0; also the legend order.
pub type CategoryCode = usize;

pub const DEFAULT_SCHEME: &str = "brimacombe_2023";
pub const DEFAULT_SENTINEL: &str = "One_network_per_publication";

const DEFAULT_MARKER_SIZE: f32 = 30.0;

const BUILTIN_SCHEMES: &[(&str, &str)] = &[(
    "brimacombe_2023",
    include_str!("../schemes/brimacombe_2023.toml"),
)];

/// Habitat qualifier used to split aggregate (and some per-study) rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Habitat {
    #[serde(rename = "Aquatic")]
    Aquatic,
    #[serde(rename = "Aquatic and terrestrial")]
    AquaticAndTerrestrial,
    #[serde(rename = "Terrestrial")]
    Terrestrial,
}

impl Habitat {
    pub const ALL: [Habitat; 3] = [
        Habitat::Aquatic,
        Habitat::AquaticAndTerrestrial,
        Habitat::Terrestrial,
    ];

    /// Exact match against the metadata spelling, after trimming.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL.into_iter().find(|h| h.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Habitat::Aquatic => "Aquatic",
            Habitat::AquaticAndTerrestrial => "Aquatic and terrestrial",
            Habitat::Terrestrial => "Terrestrial",
        }
    }
}

impl fmt::Display for Habitat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker glyphs, named after their matplotlib counterparts ("o", "*", "v", "^", "s", "D").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerShape {
    Circle,
    Star,
    TriangleDown,
    TriangleUp,
    Square,
    Diamond,
}

fn default_marker() -> MarkerShape {
    MarkerShape::Circle
}

fn default_marker_size() -> f32 {
    DEFAULT_MARKER_SIZE
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

/// How one category is drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualEncoding {
    pub label: String,
    #[serde(default = "default_marker")]
    pub marker: MarkerShape,
    pub fill: String,
    pub edge: String,
    /// Marker area in pt², the same unit as matplotlib's `s`.
    #[serde(default = "default_marker_size")]
    pub size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub habitat: Option<Habitat>,
    #[serde(flatten)]
    pub encoding: VisualEncoding,
}

#[derive(Debug, Deserialize)]
struct SchemeFile {
    name: String,
    #[serde(default = "default_sentinel")]
    sentinel: String,
    #[serde(rename = "category", default)]
    categories: Vec<CategoryEntry>,
}

/// Result of looking an author up in the scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthorMapping<'a> {
    /// The author maps to one code regardless of habitat.
    Study(CategoryCode),
    /// The author is split by habitat (the aggregate sentinel, or a study like `Havens_1992`).
    ByHabitat(&'a BTreeMap<Habitat, CategoryCode>),
}

/// The category table and the encoding table, kept as one ordered list so they cannot drift.
#[derive(Debug, Clone)]
pub struct CategoryScheme {
    name: String,
    sentinel: String,
    entries: Vec<CategoryEntry>,
    studies: HashMap<String, CategoryCode>,
    habitats: HashMap<String, BTreeMap<Habitat, CategoryCode>>,
}

impl Default for CategoryScheme {
    fn default() -> Self {
        Self::from_builtin(DEFAULT_SCHEME).expect("built-in brimacombe_2023 scheme must parse")
    }
}

impl CategoryScheme {
    pub fn from_builtin(name: &str) -> Result<Self, SchemeError> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let content = BUILTIN_SCHEMES
            .iter()
            .find(|(n, _)| *n == normalized)
            .map(|(_, c)| *c)
            .ok_or_else(|| SchemeError::UnknownBuiltin {
                name: name.to_string(),
                available: Self::list_builtins().join(", "),
            })?;
        Self::from_toml(content)
    }

    pub fn list_builtins() -> Vec<&'static str> {
        BUILTIN_SCHEMES.iter().map(|(n, _)| *n).collect()
    }

    pub fn from_toml(content: &str) -> Result<Self, SchemeError> {
        let file: SchemeFile = toml::from_str(content)
            .map_err(|e| SchemeError::Parse(format!("TOML: {}", e)))?;
        Self::new(file.name, file.sentinel, file.categories)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SchemeError> {
        let file: SchemeFile = serde_yaml::from_str(content)
            .map_err(|e| SchemeError::Parse(format!("YAML: {}", e)))?;
        Self::new(file.name, file.sentinel, file.categories)
    }

    /// TOML first, then YAML.
    pub fn from_str_any(content: &str) -> Result<Self, SchemeError> {
        match Self::from_toml(content) {
            Ok(scheme) => Ok(scheme),
            Err(SchemeError::Parse(toml_err)) => Self::from_yaml(content).map_err(|e| match e {
                SchemeError::Parse(yaml_err) => SchemeError::Parse(format!(
                    "not valid as TOML or YAML ({}; {})",
                    toml_err, yaml_err
                )),
                other => other,
            }),
            Err(other) => Err(other),
        }
    }

    /// Builds and validates a scheme. Entry order becomes code order.
    pub fn new(
        name: impl Into<String>,
        sentinel: impl Into<String>,
        entries: Vec<CategoryEntry>,
    ) -> Result<Self, SchemeError> {
        let name = name.into();
        let invalid = |message: String| SchemeError::Invalid {
            scheme: name.clone(),
            message,
        };

        if entries.is_empty() {
            return Err(invalid("no categories defined".to_string()));
        }

        let mut studies: HashMap<String, CategoryCode> = HashMap::new();
        let mut habitats: HashMap<String, BTreeMap<Habitat, CategoryCode>> = HashMap::new();

        for (code, entry) in entries.iter().enumerate() {
            let author = entry.author.trim();
            if author.is_empty() {
                return Err(invalid(format!("category {} has an empty author", code)));
            }

            match entry.habitat {
                None => {
                    if habitats.contains_key(author) {
                        return Err(invalid(format!(
                            "author '{}' is both habitat-split and a plain study",
                            author
                        )));
                    }
                    if studies.insert(author.to_string(), code).is_some() {
                        return Err(invalid(format!("duplicate author '{}'", author)));
                    }
                }
                Some(habitat) => {
                    if studies.contains_key(author) {
                        return Err(invalid(format!(
                            "author '{}' is both habitat-split and a plain study",
                            author
                        )));
                    }
                    let split = habitats.entry(author.to_string()).or_default();
                    if split.insert(habitat, code).is_some() {
                        return Err(invalid(format!(
                            "duplicate habitat '{}' for author '{}'",
                            habitat, author
                        )));
                    }
                }
            }

            let encoding = &entry.encoding;
            for color in [&encoding.fill, &encoding.edge] {
                if parse_hex_rgb(color).is_none() {
                    return Err(invalid(format!(
                        "category {} ('{}') has invalid color '{}'",
                        code, author, color
                    )));
                }
            }
            if !encoding.size.is_finite() || encoding.size <= 0.0 {
                return Err(invalid(format!(
                    "category {} ('{}') has non-positive size {}",
                    code, author, encoding.size
                )));
            }
        }

        let sentinel: String = sentinel.into();
        let sentinel = sentinel.trim().to_string();
        let split = habitats.get(&sentinel).ok_or_else(|| {
            invalid(format!(
                "sentinel author '{}' has no habitat-tagged categories",
                sentinel
            ))
        })?;
        let missing: Vec<&str> = Habitat::ALL
            .iter()
            .filter(|h| !split.contains_key(*h))
            .map(Habitat::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(invalid(format!(
                "sentinel author '{}' has no category for habitat(s): {}",
                sentinel,
                missing.join(", ")
            )));
        }
        // Aggregate codes follow every plain study code.
        if let (Some(&first_aggregate), Some(&last_study)) =
            (split.values().min(), studies.values().max())
        {
            if first_aggregate < last_study {
                return Err(invalid(format!(
                    "sentinel category {} comes before study category {}",
                    first_aggregate, last_study
                )));
            }
        }

        Ok(Self {
            name,
            sentinel,
            entries,
            studies,
            habitats,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn is_aggregate(&self, author: &str) -> bool {
        author.trim() == self.sentinel
    }

    pub fn lookup_author(&self, author: &str) -> Option<AuthorMapping<'_>> {
        let author = author.trim();
        if let Some(&code) = self.studies.get(author) {
            return Some(AuthorMapping::Study(code));
        }
        self.habitats.get(author).map(AuthorMapping::ByHabitat)
    }

    pub fn encoding_for(&self, code: CategoryCode) -> Result<&VisualEncoding, SchemeError> {
        self.entries
            .get(code)
            .map(|entry| &entry.encoding)
            .ok_or(SchemeError::UnknownCategory {
                code,
                len: self.entries.len(),
            })
    }
}

pub(crate) fn parse_hex_rgb(value: &str) -> Option<(u8, u8, u8)> {
    let hex = value.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(author: &str, habitat: Option<Habitat>) -> CategoryEntry {
        CategoryEntry {
            author: author.to_string(),
            habitat,
            encoding: VisualEncoding {
                label: author.replace('_', " "),
                marker: MarkerShape::Star,
                fill: "#1fa774".to_string(),
                edge: "#029386".to_string(),
                size: 30.0,
            },
        }
    }

    /// 21 studies, `Havens_1992` split in two, then the three aggregate habitats.
    pub(crate) fn havens_scheme() -> CategoryScheme {
        let mut entries: Vec<CategoryEntry> = (0..21)
            .map(|i| entry(&format!("Study_{:02}", i), None))
            .collect();
        entries.push(entry("Havens_1992", Some(Habitat::Aquatic)));
        entries.push(entry("Havens_1992", Some(Habitat::Terrestrial)));
        for habitat in Habitat::ALL {
            entries.push(entry(DEFAULT_SENTINEL, Some(habitat)));
        }
        CategoryScheme::new("havens_split", DEFAULT_SENTINEL, entries).unwrap()
    }

    #[test]
    fn builtin_scheme_has_base_layout() {
        let scheme = CategoryScheme::default();
        assert_eq!(scheme.name(), "brimacombe_2023");
        assert_eq!(scheme.len(), 18);
        assert_eq!(
            scheme.lookup_author("Alcorlo_et_al_2001"),
            Some(AuthorMapping::Study(0))
        );
        assert_eq!(scheme.lookup_author("Beaver_1985"), Some(AuthorMapping::Study(4)));
        assert_eq!(scheme.lookup_author("Valiela_1974"), Some(AuthorMapping::Study(14)));

        let Some(AuthorMapping::ByHabitat(split)) = scheme.lookup_author(DEFAULT_SENTINEL) else {
            panic!("sentinel must be habitat-split");
        };
        assert_eq!(split.get(&Habitat::Aquatic), Some(&15));
        assert_eq!(split.get(&Habitat::AquaticAndTerrestrial), Some(&16));
        assert_eq!(split.get(&Habitat::Terrestrial), Some(&17));
    }

    #[test]
    fn from_builtin_accepts_hyphenated_and_case_insensitive_names() {
        let underscore = CategoryScheme::from_builtin("brimacombe_2023").expect("underscore");
        let hyphen = CategoryScheme::from_builtin("Brimacombe-2023").expect("hyphen");
        assert_eq!(underscore.entries(), hyphen.entries());
    }

    #[test]
    fn unknown_builtin_lists_available() {
        let err = CategoryScheme::from_builtin("nope").unwrap_err();
        assert!(err.to_string().contains("brimacombe_2023"));
    }

    #[test]
    fn havens_split_places_aggregates_last() {
        let scheme = havens_scheme();
        assert_eq!(scheme.len(), 26);
        let Some(AuthorMapping::ByHabitat(havens)) = scheme.lookup_author("Havens_1992") else {
            panic!("Havens_1992 must be habitat-split");
        };
        assert_eq!(havens.get(&Habitat::Aquatic), Some(&21));
        assert_eq!(havens.get(&Habitat::Terrestrial), Some(&22));
        let Some(AuthorMapping::ByHabitat(agg)) = scheme.lookup_author(DEFAULT_SENTINEL) else {
            panic!("sentinel must be habitat-split");
        };
        assert_eq!(agg.get(&Habitat::Terrestrial), Some(&25));
    }

    #[test]
    fn encoding_for_rejects_out_of_range_code() {
        let scheme = CategoryScheme::default();
        assert_eq!(scheme.encoding_for(4).unwrap().label, "Beaver (1985)");
        assert_eq!(
            scheme.encoding_for(18),
            Err(SchemeError::UnknownCategory { code: 18, len: 18 })
        );
    }

    #[test]
    fn rejects_duplicate_and_mixed_authors() {
        let dup = CategoryScheme::new(
            "dup",
            DEFAULT_SENTINEL,
            vec![entry("A_2000", None), entry("A_2000", None)],
        );
        assert!(matches!(dup, Err(SchemeError::Invalid { .. })));

        let mixed = CategoryScheme::new(
            "mixed",
            DEFAULT_SENTINEL,
            vec![entry("A_2000", None), entry("A_2000", Some(Habitat::Aquatic))],
        );
        assert!(matches!(mixed, Err(SchemeError::Invalid { .. })));

        let empty = CategoryScheme::new("empty", DEFAULT_SENTINEL, Vec::new());
        assert!(matches!(empty, Err(SchemeError::Invalid { .. })));
    }

    #[test]
    fn rejects_bad_colors() {
        let mut bad = entry("A_2000", None);
        bad.encoding.fill = "xkcd:jade".to_string();
        let result = CategoryScheme::new("bad", DEFAULT_SENTINEL, vec![bad]);
        assert!(matches!(result, Err(SchemeError::Invalid { .. })));
    }

    #[test]
    fn yaml_scheme_falls_back_after_toml() {
        let yaml = r##"
name: tiny
category:
  - author: Beaver_1985
    label: Beaver (1985)
    fill: "#b8ffeb"
    edge: "#06b1c4"
  - author: One_network_per_publication
    habitat: Aquatic
    label: Aquatic
    marker: star
    fill: "#1fa774"
    edge: "#029386"
  - author: One_network_per_publication
    habitat: Aquatic and terrestrial
    label: Aquatic and terrestrial
    fill: "#1fa774"
    edge: "#029386"
  - author: One_network_per_publication
    habitat: Terrestrial
    label: Terrestrial
    marker: triangle-down
    fill: "#1fa774"
    edge: "#029386"
    size: 25
"##;
        let scheme = CategoryScheme::from_str_any(yaml).expect("yaml scheme");
        assert_eq!(scheme.name(), "tiny");
        assert_eq!(scheme.sentinel(), DEFAULT_SENTINEL);
        assert_eq!(scheme.encoding_for(0).unwrap().marker, MarkerShape::Circle);
        assert_eq!(scheme.encoding_for(3).unwrap().marker, MarkerShape::TriangleDown);
        assert!(scheme.is_aggregate("One_network_per_publication"));
    }

    fn with_sentinel(sentinel: &str, habitats: &[Habitat]) -> Vec<CategoryEntry> {
        let mut entries = vec![entry("Beaver_1985", None)];
        entries.extend(habitats.iter().map(|&h| entry(sentinel, Some(h))));
        entries
    }

    #[test]
    fn sentinel_must_cover_every_habitat() {
        let none = CategoryScheme::new("none", "Aggregate", with_sentinel("Aggregate", &[]));
        assert!(
            matches!(none, Err(SchemeError::Invalid { ref message, .. }) if message.contains("Aggregate")),
            "{:?}",
            none
        );

        let partial = CategoryScheme::new(
            "partial",
            DEFAULT_SENTINEL,
            with_sentinel(DEFAULT_SENTINEL, &[Habitat::Aquatic, Habitat::Terrestrial]),
        );
        assert!(
            matches!(partial, Err(SchemeError::Invalid { ref message, .. })
                if message.contains("Aquatic and terrestrial")),
            "{:?}",
            partial
        );
    }

    #[test]
    fn custom_sentinel_name_is_honoured() {
        let scheme =
            CategoryScheme::new("custom", "Aggregate", with_sentinel("Aggregate", &Habitat::ALL))
                .unwrap();
        assert_eq!(scheme.sentinel(), "Aggregate");
        assert!(scheme.is_aggregate(" Aggregate "));
        assert!(!scheme.is_aggregate(DEFAULT_SENTINEL));
    }

    #[test]
    fn sentinel_codes_follow_study_codes() {
        let mut entries: Vec<CategoryEntry> = Habitat::ALL
            .iter()
            .map(|&h| entry(DEFAULT_SENTINEL, Some(h)))
            .collect();
        entries.push(entry("Beaver_1985", None));
        let result = CategoryScheme::new("late_study", DEFAULT_SENTINEL, entries);
        assert!(matches!(result, Err(SchemeError::Invalid { .. })), "{:?}", result);
    }

    #[test]
    fn every_builtin_places_aggregates_after_studies() {
        for name in CategoryScheme::list_builtins() {
            let scheme = CategoryScheme::from_builtin(name).unwrap();
            let last_study = scheme
                .entries()
                .iter()
                .rposition(|e| e.habitat.is_none())
                .unwrap();
            for (code, entry) in scheme.entries().iter().enumerate() {
                if scheme.is_aggregate(&entry.author) {
                    assert!(code > last_study, "{}: aggregate code {}", name, code);
                }
            }
        }
    }

    #[test]
    fn habitat_parse_is_exact() {
        assert_eq!(Habitat::parse(" Terrestrial "), Some(Habitat::Terrestrial));
        assert_eq!(
            Habitat::parse("Aquatic and terrestrial"),
            Some(Habitat::AquaticAndTerrestrial)
        );
        assert_eq!(Habitat::parse("terrestrial"), None);
        assert_eq!(Habitat::parse("Marine"), None);
    }
}
