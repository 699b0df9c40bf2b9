// resolver.rs - OrdinalResolver over per-level string fast fields

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tantivy::schema::FieldType;
use tantivy::{DocAddress, Searcher};

use super::global_ordinals::GlobalOrdinals;
use crate::error::configuration_error;
use crate::host::{Ordinal, OrdinalResolver};

/// Level `k` reads its join key from `key_columns[k]`. Levels that name the
/// same column share one set of global ordinals.
pub struct FastFieldOrdinals {
    levels: Vec<Arc<GlobalOrdinals>>,
}

impl FastFieldOrdinals {
    pub fn open(searcher: &Searcher, key_columns: &[String]) -> Result<Self> {
        let mut by_column: HashMap<&str, Arc<GlobalOrdinals>> = HashMap::new();
        let mut levels = Vec::with_capacity(key_columns.len());
        for column in key_columns {
            let ordinals = match by_column.get(column.as_str()) {
                Some(shared) => shared.clone(),
                None => {
                    check_string_fast_field(searcher, column)?;
                    let built = Arc::new(GlobalOrdinals::build(searcher, column)?);
                    by_column.insert(column.as_str(), built.clone());
                    built
                }
            };
            levels.push(ordinals);
        }
        Ok(Self { levels })
    }
}

impl OrdinalResolver for FastFieldOrdinals {
    fn ordinals(&self, level: usize, doc: DocAddress, out: &mut Vec<Ordinal>) -> Result<()> {
        out.clear();
        let ordinals = self.levels.get(level).ok_or_else(|| {
            configuration_error(format!("no key column configured for level {}", level))
        })?;
        ordinals.ordinals_for_doc(doc, out);
        Ok(())
    }
}

/// Join keys and bucket terms must be string fields with fast storage.
pub(crate) fn check_string_fast_field(searcher: &Searcher, column: &str) -> Result<()> {
    let schema = searcher.schema();
    let field = schema
        .get_field(column)
        .map_err(|_| configuration_error(format!("field '{}' does not exist in the schema", column)))?;
    let entry = schema.get_field_entry(field);
    if !matches!(entry.field_type(), FieldType::Str(_)) || !entry.is_fast() {
        return Err(configuration_error(format!(
            "field '{}' must be a string fast field",
            column
        )));
    }
    Ok(())
}
