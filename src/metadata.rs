use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::InputError;

const WHAT: &str = "metadata table";

/// Each required column with the header spellings accepted for it.
const REQUIRED_COLUMNS: [(&str, &[&str]); 3] = [
    ("name", &["name"]),
    ("author", &["author"]),
    ("primaryType", &["primaryType", "Primary_type"]),
];

/// One metadata record per network, in file order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkMetadataRow {
    pub name: String,
    pub author: String,
    /// Raw habitat string; only consulted for habitat-split authors.
    #[serde(rename = "primaryType", alias = "Primary_type")]
    pub primary_type: String,
}

impl NetworkMetadataRow {
    pub fn new(name: &str, author: &str, primary_type: &str) -> Self {
        Self {
            name: name.to_string(),
            author: author.to_string(),
            primary_type: primary_type.to_string(),
        }
    }
}

pub fn load_metadata(path: &Path) -> Result<Vec<NetworkMetadataRow>, InputError> {
    let file = std::fs::File::open(path).map_err(|source| InputError::Io {
        what: format!("{} {}", WHAT, path.display()),
        source,
    })?;
    let rows = read_metadata(file)?;
    info!(rows = rows.len(), path = %path.display(), "loaded network metadata");
    Ok(rows)
}

pub fn read_metadata<R: Read>(reader: R) -> Result<Vec<NetworkMetadataRow>, InputError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).from_reader(reader);

    let headers = rdr
        .headers()
        .map_err(|source| InputError::Csv {
            what: WHAT.to_string(),
            source,
        })?
        .clone();
    for (column, spellings) in REQUIRED_COLUMNS {
        let found: Vec<&str> = headers
            .iter()
            .filter(|h| spellings.contains(h))
            .collect();
        match found.len() {
            0 => {
                return Err(InputError::MissingColumn {
                    what: WHAT.to_string(),
                    column: column.to_string(),
                });
            }
            1 => {}
            _ => {
                return Err(InputError::AmbiguousColumn {
                    what: WHAT.to_string(),
                    column: column.to_string(),
                    spellings: found.join(", "),
                });
            }
        }
    }
    debug!(columns = headers.len(), "metadata header accepted");

    rdr.deserialize()
        .map(|record| {
            record.map_err(|source| InputError::Csv {
                what: WHAT.to_string(),
                source,
            })
        })
        .collect()
}
